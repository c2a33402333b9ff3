pub mod agents;
pub mod config_cmd;
pub mod extract;
pub mod onboard;
pub mod run;
pub mod status;
pub mod tools;
