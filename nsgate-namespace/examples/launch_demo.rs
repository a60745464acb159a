//! Interactive launch demonstration
//!
//! Run with: cargo run --example launch_demo
//! Run as root: sudo cargo run --example launch_demo

use nsgate_core::LaunchRequest;
use nsgate_namespace::{LaunchConfig, NamespaceConfig, NamespaceInfo, NamespaceLauncher};

/// Check if running as root
fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

fn main() {
    println!("🔒 nsgate Launch Demo\n");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(std::io::stderr)
        .init();

    demo_current_namespaces();
    demo_config_options();

    if is_root() {
        println!("\n🔐 Running with root privileges - launching in new namespaces\n");
        demo_launch(LaunchConfig::default().with_interface(None::<String>));
    } else {
        println!("\n⚠️  Run with sudo to see namespace isolation; launching without it\n");
        demo_launch(
            LaunchConfig::default()
                .with_namespaces(NamespaceConfig::none())
                .with_id_mapping(None)
                .with_interface(None::<String>),
        );
    }
}

fn demo_current_namespaces() {
    println!("📊 Current Process Namespaces:");
    println!("{:-<60}", "");

    match NamespaceInfo::current() {
        Ok(ns_info) => println!("  {ns_info}"),
        Err(e) => println!("❌ Failed to get namespaces: {e}"),
    }
    println!();
}

fn demo_config_options() {
    println!("⚙️  Configuration Options:\n");

    let configs = vec![
        ("Default", NamespaceConfig::new()),
        ("No network", NamespaceConfig::new().with_network(false)),
        ("None", NamespaceConfig::none()),
    ];

    for (name, config) in configs {
        let enabled = config.enabled_namespaces();
        println!("  {}: {}", name, enabled.join(", "));
    }
    println!();
}

fn demo_launch(config: LaunchConfig) {
    println!("🚀 Launching:");
    println!("{:-<60}", "");

    let launcher = match NamespaceLauncher::new(config) {
        Ok(launcher) => launcher,
        Err(e) => {
            println!("❌ Invalid configuration: {e}");
            return;
        }
    };

    let request = match LaunchRequest::new(
        "/bin/sh",
        ["-c", "echo \"uid=$(id -u) gid=$(id -g) $(readlink /proc/self/ns/net)\""],
    ) {
        Ok(request) => request,
        Err(e) => {
            println!("❌ Invalid request: {e}");
            return;
        }
    };

    match launcher.launch(&request) {
        Ok(outcome) => println!(
            "✅ Child {} finished with code {}",
            outcome.child,
            outcome.status.code()
        ),
        Err(e) => println!("❌ Launch failed: {e}"),
    }
}
