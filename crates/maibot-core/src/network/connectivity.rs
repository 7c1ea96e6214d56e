//! Reachability checks run before a deployment.

use crate::config::NetworkConfig;
use crate::network::client::HttpClient;
use crate::Result;
use futures::future::join_all;
use tracing::{debug, info};

/// Which upstream hosts answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Connectivity {
    pub github_api: bool,
    pub github: bool,
    pub mirror: bool,
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        self.github_api || self.github || self.mirror
    }

    /// The mirror answers but GitHub does not.
    pub fn needs_proxy(&self) -> bool {
        self.mirror && !(self.github && self.github_api)
    }

    fn set(&mut self, target: &str, reachable: bool) {
        match target {
            "github_api" => self.github_api = reachable,
            "github" => self.github = reachable,
            "mirror" => self.mirror = reachable,
            _ => {}
        }
    }
}

/// Check every host in [`NetworkConfig::CONNECTIVITY_TARGETS`] concurrently.
pub async fn check_connectivity() -> Result<Connectivity> {
    let client = HttpClient::with_timeout(NetworkConfig::QUICK_REQUEST_TIMEOUT)?;
    Ok(check_all(&client, NetworkConfig::CONNECTIVITY_TARGETS).await)
}

async fn check_all(client: &HttpClient, targets: &[(&str, &str)]) -> Connectivity {
    let results = join_all(targets.iter().map(|(name, url)| async move {
        let reachable = match client.head(url, NetworkConfig::QUICK_REQUEST_TIMEOUT).await {
            // Any HTTP answer proves the host is reachable.
            Ok(response) => {
                debug!("{} answered {}", url, response.status());
                true
            }
            Err(e) => {
                debug!("{} unreachable: {}", url, e);
                false
            }
        };
        (*name, reachable)
    }))
    .await;

    let mut connectivity = Connectivity::default();
    for (name, reachable) in results {
        connectivity.set(name, reachable);
    }
    info!(
        "Connectivity: github_api={} github={} mirror={}",
        connectivity.github_api, connectivity.github, connectivity.mirror
    );
    connectivity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_flags() {
        let all = Connectivity {
            github_api: true,
            github: true,
            mirror: true,
        };
        assert!(all.is_online());
        assert!(!all.needs_proxy());

        let mirror_only = Connectivity {
            mirror: true,
            ..Default::default()
        };
        assert!(mirror_only.is_online());
        assert!(mirror_only.needs_proxy());

        let offline = Connectivity::default();
        assert!(!offline.is_online());
        assert!(!offline.needs_proxy());
    }

    #[test]
    fn test_set_ignores_unknown_target() {
        let mut connectivity = Connectivity::default();
        connectivity.set("github", true);
        connectivity.set("gitee", true);
        assert!(connectivity.github);
        assert!(!connectivity.github_api);
    }

    #[tokio::test]
    async fn test_check_all_empty() {
        let client = HttpClient::new().unwrap();
        assert_eq!(check_all(&client, &[]).await, Connectivity::default());
    }
}
