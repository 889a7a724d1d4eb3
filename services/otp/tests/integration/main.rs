
mod concurrency_test;
mod issue_test;
mod rate_limit_test;
