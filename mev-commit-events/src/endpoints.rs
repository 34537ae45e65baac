//! Static table of known indexing service endpoints.

/// A named indexing service deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Short name used on the command line.
    pub name: &'static str,
    /// Service base URL.
    pub url: &'static str,
    /// Whether the endpoint indexes a test network.
    pub is_testnet: bool,
}

/// Default endpoint: the mev-commit chain itself.
pub const MEV_COMMIT: Endpoint = Endpoint {
    name: "mev-commit",
    url: "https://mev-commit.hypersync.xyz",
    is_testnet: true,
};

/// All known endpoints (single source of truth).
pub const ALL: &[Endpoint] = &[
    MEV_COMMIT,
    Endpoint {
        name: "holesky",
        url: "https://holesky.hypersync.xyz",
        is_testnet: true,
    },
    Endpoint {
        name: "ethereum",
        url: "https://eth.hypersync.xyz",
        is_testnet: false,
    },
];

/// Look up an [`Endpoint`] by name.
#[must_use]
pub fn by_name(name: &str) -> Option<&'static Endpoint> {
    ALL.iter().find(|e| e.name == name)
}
