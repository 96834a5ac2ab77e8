//! Daemon lifecycle commands (stop, status).

use std::time::Duration;

use notifyd_core::Paths;

use crate::control::{ControlClient, Method};

/// Stop a running daemon.
pub async fn stop_daemon(paths: &Paths) -> anyhow::Result<()> {
    let socket_path = paths.socket_file();
    let pid_path = paths.pid_file();

    if !socket_path.exists() {
        println!("Daemon is not running (no control socket)");
        if pid_path.exists() {
            let _ = std::fs::remove_file(&pid_path);
        }
        return Ok(());
    }

    let client = ControlClient::new(socket_path.clone());
    match client.call_method(Method::Shutdown).await {
        Ok(response) if response.is_success() => println!("Shutdown requested"),
        Ok(response) => println!("Shutdown failed: {:?}", response.error),
        Err(e) => println!("Could not reach the daemon: {}", e),
    }

    // Wait for the socket to disappear (up to 3 seconds).
    for _ in 0..30 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if !socket_path.exists() {
            println!("Daemon exited");
            return Ok(());
        }
    }

    if let Ok(pid) = std::fs::read_to_string(&pid_path) {
        println!(
            "Daemon did not stop gracefully; process {} may still be running",
            pid.trim()
        );
    }
    let _ = std::fs::remove_file(&socket_path);
    println!("Cleaned up socket file");

    Ok(())
}

/// Report whether the daemon is running, and what it is doing.
pub async fn show_status(paths: &Paths) -> anyhow::Result<()> {
    let socket_path = paths.socket_file();

    if !socket_path.exists() {
        println!("Daemon is not running (no control socket)");
        return Ok(());
    }

    let client = ControlClient::new(socket_path.clone());
    let health = match client.call_method(Method::Health).await {
        Ok(response) => response,
        Err(e) => {
            println!("Could not reach the daemon: {}", e);
            println!("The socket may be stale; `tavola-notifyd stop` cleans it up");
            return Ok(());
        }
    };

    if !health.is_success() {
        println!("Daemon returned error: {:?}", health.error);
        return Ok(());
    }

    let version = health
        .result
        .as_ref()
        .and_then(|result| result.get("version"))
        .and_then(|value| value.as_str())
        .unwrap_or("unknown")
        .to_string();

    println!("Daemon is running");
    println!("  Version: {}", version);
    if let Ok(pid) = std::fs::read_to_string(paths.pid_file()) {
        println!("  PID:     {}", pid.trim());
    }
    println!("  Socket:  {}", socket_path.display());

    // Channel and delivery snapshots, best effort.
    if let Ok(response) = client.call_method(Method::ChannelStatus).await {
        if let Some(result) = response.result {
            let state = result
                .get("state")
                .and_then(|value| value.as_str())
                .unwrap_or("unknown")
                .to_string();
            println!("  Channel: {}", state);
        }
    }
    if let Ok(response) = client.call_method(Method::DeliveryStats).await {
        if let Some(result) = response.result {
            let total = result.get("total").and_then(|v| v.as_u64()).unwrap_or(0);
            let pending = result.get("pending").and_then(|v| v.as_u64()).unwrap_or(0);
            let failed = result.get("failed").and_then(|v| v.as_u64()).unwrap_or(0);
            println!(
                "  Orders:  {} tracked, {} pending, {} failed",
                total, pending, failed
            );
        }
    }

    Ok(())
}
