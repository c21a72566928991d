pub mod control;
pub mod manager;

#[cfg(unix)]
mod unix_service;
#[cfg(windows)]
mod windows_service;
