//! Integration tests for linkhound

mod pipeline_tests;
