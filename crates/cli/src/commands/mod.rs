pub mod doctor;
pub mod init;
pub mod process;
pub mod run;
pub mod runtime;
