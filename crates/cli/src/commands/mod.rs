pub mod chat;
pub mod memory;
pub mod onboard;
pub mod serve;
pub mod status;
