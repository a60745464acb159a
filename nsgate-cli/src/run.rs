//! Launch logic behind the command line

use anyhow::{Context, Result};
use nsgate_core::LaunchRequest;
use nsgate_namespace::{LaunchConfig, NamespaceLauncher};
use tracing::{debug, info, warn};

use crate::cli::Cli;

/// Run the launch described by `args` and return the process exit code
pub fn execute(args: Cli) -> Result<i32> {
    let config = build_config(&args)?;
    let request =
        LaunchRequest::from_argv(args.command).context("Invalid command")?;

    if config.namespaces.user && !nix::unistd::geteuid().is_root() {
        warn!("⚠️  Not running as root; writing the identity map will likely fail");
    }

    debug!(config = ?config, "Launch configuration");

    let launcher = NamespaceLauncher::new(config).context("Invalid launch configuration")?;
    let outcome = launcher
        .launch(&request)
        .with_context(|| format!("Failed to launch {}", request.program()))?;

    if outcome.status.success() {
        info!("✅ Child {} finished", outcome.child);
    } else if let Some(failure) = outcome.status.setup_failure() {
        warn!(
            "⚠️  Child {} exited with code {}: {failure}",
            outcome.child,
            outcome.status.code()
        );
    } else {
        warn!(
            "⚠️  Child {} exited with code: {}",
            outcome.child,
            outcome.status.code()
        );
    }

    // The launcher's job ends at reaping; the child's status is informational
    // unless asked for.
    Ok(if args.propagate_exit {
        outcome.status.code()
    } else {
        0
    })
}

/// Merge the optional config file with command-line overrides
///
/// The file is only parsed here; the merged result is validated when the
/// launcher is built.
fn build_config(args: &Cli) -> Result<LaunchConfig> {
    let mut config = match args.config {
        Some(ref path) => LaunchConfig::parse_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LaunchConfig::default(),
    };

    if args.no_user {
        config.namespaces.user = false;
    }
    if args.no_net {
        config.namespaces.network = false;
    }
    if args.no_mount {
        config.namespaces.mount = false;
    }

    if let Some(mapping) = args.id_map {
        config.id_mapping = Some(mapping);
    }
    if args.deny_setgroups {
        config.deny_setgroups = true;
    }

    // Maps can only be written for a process in a fresh user namespace.
    if !config.namespaces.user {
        config.id_mapping = None;
        config.deny_setgroups = false;
    }

    if args.no_interface {
        config.interface = None;
    } else if let Some(ref interface) = args.interface {
        config.interface = Some(interface.clone());
    } else if !config.namespaces.network {
        // Nowhere to move the default interface to.
        config.interface = None;
    }
    if let Some(ref helper) = args.helper {
        config.helper.clone_from(helper);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("launcher").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_match_fixed_deployment() {
        let config = build_config(&parse(&["/bin/echo", "hello"])).unwrap();

        assert_eq!(config, LaunchConfig::default());
    }

    #[test]
    fn test_trailing_args_keep_hyphens() {
        let cli = parse(&["-v", "/bin/ls", "-la", "--color"]);

        assert!(cli.verbose);
        assert_eq!(cli.command, vec!["/bin/ls", "-la", "--color"]);
    }

    #[test]
    fn test_overrides() {
        let cli = parse(&[
            "--id-map",
            "0:100000:65536",
            "--interface",
            "veth1",
            "--helper",
            "/usr/libexec/move-link",
            "--deny-setgroups",
            "--no-mount",
            "/bin/true",
        ]);
        let config = build_config(&cli).unwrap();

        assert_eq!(config.id_mapping.unwrap().outer(), 100_000);
        assert_eq!(config.interface.as_deref(), Some("veth1"));
        assert_eq!(config.helper.to_str(), Some("/usr/libexec/move-link"));
        assert!(config.deny_setgroups);
        assert!(config.namespaces.user);
        assert!(!config.namespaces.mount);
    }

    #[test]
    fn test_no_user_drops_identity_map() {
        let cli = parse(&["--no-user", "--deny-setgroups", "--no-interface", "/bin/true"]);
        let config = build_config(&cli).unwrap();

        assert!(config.id_mapping.is_none());
        assert!(!config.deny_setgroups);
        assert!(config.interface.is_none());
    }

    #[test]
    fn test_no_net_drops_default_interface() {
        let config = build_config(&parse(&["--no-net", "/bin/true"])).unwrap();
        assert!(config.interface.is_none());

        // Asked for explicitly: kept, and rejected when the launcher is built.
        let cli = parse(&["--no-net", "--interface", "eth0", "/bin/true"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.interface.as_deref(), Some("eth0"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_fixed_by_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launch.json");
        std::fs::write(
            &path,
            r#"{"interface": "waytoolonginterface", "id_mapping": null}"#,
        )
        .unwrap();
        let path = path.to_str().unwrap();

        let cli = parse(&["-c", path, "--no-interface", "--id-map", "0:2000:10", "/bin/true"]);
        let config = build_config(&cli).unwrap();

        assert!(config.interface.is_none());
        assert_eq!(config.id_mapping.unwrap().outer(), 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_interface_conflicts_with_no_interface() {
        let result = Cli::try_parse_from([
            "launcher",
            "--interface",
            "eth0",
            "--no-interface",
            "/bin/true",
        ]);
        assert!(result.is_err());
    }
}
