use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};
use clap::{ArgGroup, Parser};

/// Flag the registrar embeds in the service command line.
pub const RUN_ARG: &str = "--run";

/// Directory holding the running executable, where the log file lives.
pub fn root_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("executable {} has no parent directory", exe.display()))
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(group(ArgGroup::new("action").args(["install", "remove", "run"]).multiple(false)))]
pub struct Args {
    /// Install a service using the given config file
    #[arg(long, value_name = "CONFIG")]
    pub install: Option<PathBuf>,

    /// Remove the service registered under the given name
    #[arg(long, value_name = "NAME")]
    pub remove: Option<String>,

    /// Used internally for running the service
    #[arg(long, value_name = "CONFIG")]
    pub run: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Install(PathBuf),
    Remove(String),
    Run(PathBuf),
}

impl Args {
    pub fn parse_env() -> Self {
        Args::parse_from(normalize_args(std::env::args_os()))
    }

    pub fn action(self) -> Option<Action> {
        if let Some(config) = self.install {
            Some(Action::Install(config))
        } else if let Some(name) = self.remove {
            Some(Action::Remove(name))
        } else {
            self.run.map(Action::Run)
        }
    }
}

/// Accepts the single-dash spelling (`-install`) alongside clap's `--install`.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some("-install") | Some("-remove") | Some("-run") => {
                let mut long = OsString::from("-");
                long.push(&arg);
                long
            }
            _ => arg,
        })
        .collect()
}

/// Absolute form of `path` without touching the filesystem.
pub fn absolute_path(path: &Path) -> io::Result<PathBuf> {
    std::path::absolute(path)
}
