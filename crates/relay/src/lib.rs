pub mod imap;
pub mod mailbox;
pub mod poller;
pub mod signal;
pub mod supervisor;
