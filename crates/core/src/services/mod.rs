pub mod models;
pub mod oracle;
pub mod pipeline;
pub mod run_log;
pub mod validator;
