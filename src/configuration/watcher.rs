use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::command;
use crate::command::server;
use crate::configuration::{Configuration, ServerTlsConfig};

/// Reloads the server whenever the configuration file or the TLS material it references changes
pub struct ConfigWatcher {
    _handle: tokio::task::JoinHandle<()>,
}

impl ConfigWatcher {
    pub fn new(config_path: &str, server: Arc<server::Command>) -> Result<Self, command::Error> {
        info!("Setting up config watcher for: {config_path}");

        let config_file_path = std::fs::canonicalize(PathBuf::from(config_path))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = watch_config_loop(config_file_path, server).await {
                error!("Config watcher failed: {e}");
            }
        });

        Ok(Self { _handle: handle })
    }
}

fn get_tls_paths(tls_config: &ServerTlsConfig, config_dir: &Path) -> HashSet<PathBuf> {
    [
        Some(&tls_config.server_certificate_bundle),
        Some(&tls_config.server_private_key),
        tls_config.client_ca_bundle.as_ref(),
    ]
    .into_iter()
    .flatten()
    .filter_map(|path_str| {
        let path = Path::new(path_str);
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            config_dir.join(path)
        };
        resolved.canonicalize().ok()
    })
    .collect()
}

fn watched_tls_paths(config: &Configuration, config_dir: &Path) -> HashSet<PathBuf> {
    config
        .server
        .tls
        .as_ref()
        .map(|tls_config| get_tls_paths(tls_config, config_dir))
        .unwrap_or_default()
}

async fn watch_config_loop(
    config_path: PathBuf,
    server: Arc<server::Command>,
) -> Result<(), command::Error> {
    let (tx, mut rx) = mpsc::channel::<Event>(100);
    let config_dir = config_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    loop {
        let tx_clone = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx_clone.blocking_send(event);
            }
        })?;

        watcher.watch(&config_path, RecursiveMode::NonRecursive)?;

        let current_config = Configuration::load(&config_path)?;
        let tls_paths = watched_tls_paths(&current_config, &config_dir);
        for path in &tls_paths {
            watcher.watch(path, RecursiveMode::NonRecursive)?;
            info!("Watching TLS file: {path:?}");
        }

        let mut should_restart_watcher = false;

        while !should_restart_watcher {
            match rx.recv().await {
                Some(event)
                    if matches!(
                        event.kind,
                        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
                    ) =>
                {
                    if event.paths.iter().any(|p| p == &config_path) {
                        info!("Configuration file changed, reloading");

                        let new_config = match Configuration::load(&config_path) {
                            Ok(config) => config,
                            Err(err) => {
                                error!("Failed to reload configuration: {err}");
                                continue;
                            }
                        };

                        if watched_tls_paths(&new_config, &config_dir) != tls_paths {
                            info!("TLS file paths changed, recreating watchers");
                            should_restart_watcher = true;
                        }

                        reload_full_config(&server, &new_config);
                    } else if event.paths.iter().any(|p| tls_paths.contains(p)) {
                        info!("TLS certificate changed, reloading");
                        reload_tls_only(&server, &config_path);
                    }
                }
                None => {
                    error!("Config watcher channel closed");
                    return Ok(());
                }
                _ => {}
            }
        }

        drop(watcher);
    }
}

fn reload_full_config(server: &server::Command, config: &Configuration) {
    if let Err(e) = server.notify_config_change(config) {
        error!("Failed to apply configuration change: {e}");
    } else {
        info!("Configuration reloaded");
    }
}

fn reload_tls_only(server: &server::Command, config_path: &Path) {
    let Ok(config) = Configuration::load(config_path) else {
        return;
    };

    if let Some(tls_config) = &config.server.tls {
        match server.notify_tls_config_change(tls_config) {
            Ok(()) => info!("TLS configuration reloaded"),
            Err(e) => error!("Failed to reload TLS configuration: {e}"),
        }
    }
}
