mod upstream_tests;
