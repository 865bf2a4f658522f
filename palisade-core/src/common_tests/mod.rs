pub mod safe_collection_stress_tests;
