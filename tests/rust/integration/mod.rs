mod persistence_flow_tests;
mod translation_flow_tests;
