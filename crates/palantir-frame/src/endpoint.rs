use std::collections::BTreeMap;

/// Default origin serving the sub-context bundle.
pub const DEFAULT_SECURE_SITE: &str = "https://secure.palantir.dev/sdk";

const RPC_BASE: &str = "https://rpc.palantir.dev";

/// CAIP-2 ids of the networks the sub-context can operate on.
const KNOWN_NETWORKS: &[&str] = &[
    "eip155:1",
    "eip155:10",
    "eip155:56",
    "eip155:100",
    "eip155:137",
    "eip155:324",
    "eip155:8453",
    "eip155:42161",
    "eip155:42220",
    "eip155:43114",
    "eip155:7777777",
    "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp",
    "solana:4uhcVJyU9pJkvQyS88uRDiswHXSCkY3z",
];

/// Per-network RPC endpoint derived from the project identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEndpoint {
    pub chain_id: String,
    pub rpc_url: String,
}

/// Identity of one sub-context instance: which project it serves and which
/// chain it boots on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    pub project_id: String,
    pub chain_id: u64,
    pub secure_site: String,
}

impl FrameConfig {
    pub fn new(project_id: impl Into<String>, chain_id: u64) -> Self {
        Self {
            project_id: project_id.into(),
            chain_id,
            secure_site: DEFAULT_SECURE_SITE.to_string(),
        }
    }

    pub fn with_secure_site(mut self, secure_site: impl Into<String>) -> Self {
        self.secure_site = secure_site.into();
        self
    }

    /// Address the sub-context is loaded from.
    pub fn endpoint(&self) -> String {
        format!(
            "{}?projectId={}&chainId={}",
            self.secure_site, self.project_id, self.chain_id
        )
    }

    /// Supported networks with their project-scoped RPC endpoints.
    pub fn networks(&self) -> BTreeMap<String, NetworkEndpoint> {
        KNOWN_NETWORKS
            .iter()
            .map(|id| {
                (
                    (*id).to_string(),
                    NetworkEndpoint {
                        chain_id: (*id).to_string(),
                        rpc_url: format!(
                            "{RPC_BASE}/v1/?chainId={id}&projectId={}",
                            self.project_id
                        ),
                    },
                )
            })
            .collect()
    }

    pub fn available_chain_ids(&self) -> Vec<String> {
        self.networks().into_keys().collect()
    }
}
