//! CLI argument definitions

use clap::Parser;
use nsgate_core::IdMapping;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "launcher")]
#[command(
    about = "Launch a program in new user, network and mount namespaces",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// JSON launch configuration; flags below override it
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Identity range written to uid_map and gid_map
    #[arg(long, value_name = "INNER:OUTER:LEN")]
    pub id_map: Option<IdMapping>,

    /// Network interface to move into the new namespace
    #[arg(long, value_name = "NAME", conflicts_with = "no_interface")]
    pub interface: Option<String>,

    /// Skip interface migration
    #[arg(long)]
    pub no_interface: bool,

    /// Helper that moves the interface, called as `helper <pid>`
    #[arg(long, value_name = "PATH")]
    pub helper: Option<PathBuf>,

    /// Write "deny" to setgroups before the gid map
    #[arg(long)]
    pub deny_setgroups: bool,

    /// Do not create a user namespace
    #[arg(long)]
    pub no_user: bool,

    /// Do not create a network namespace
    #[arg(long)]
    pub no_net: bool,

    /// Do not create a mount namespace
    #[arg(long)]
    pub no_mount: bool,

    /// Exit with the child's status instead of 0
    #[arg(long)]
    pub propagate_exit: bool,

    /// Program to run, followed by its arguments
    #[arg(
        value_name = "PROGRAM",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}
