mod helpers;

mod queue_tests;
