pub mod periodic_task;
