//! Static network registry and descriptor resolution.

use crate::config::VerifiedParams;
use crate::domain::{NetworkDescriptor, NetworkInput, NodeProtocol};
use crate::error::SdkError;

const DEFAULT_GAS_RELAY_HUB: &str = "0xD216153c06E857cD7f72665E0aF1d7D82172F494";

/// Chains the verified relay can prove state for.
pub const VERIFIED_CHAINS: &[&str] = &["mainnet", "kovan", "goerli"];

struct RegistryEntry {
    alias: &'static str,
    node_url: &'static str,
    chain_id: &'static str,
    gas_relay_hub: Option<&'static str>,
}

const REGISTRY: &[RegistryEntry] = &[
    RegistryEntry {
        alias: "mainnet",
        node_url: "https://eth-mainnet.gateway.pokt.network/v1/lb/61391a62a2d82e0037c1a204",
        chain_id: "1",
        gas_relay_hub: Some(DEFAULT_GAS_RELAY_HUB),
    },
    RegistryEntry {
        alias: "ropsten",
        node_url: "https://eth-ropsten.gateway.pokt.network/v1/lb/61391abba2d82e0037c1a458",
        chain_id: "3",
        gas_relay_hub: Some(DEFAULT_GAS_RELAY_HUB),
    },
    RegistryEntry {
        alias: "rinkeby",
        node_url: "https://eth-rinkeby.gateway.pokt.network/v1/lb/61391b30a2d82e0037c1a7fc",
        chain_id: "4",
        gas_relay_hub: Some(DEFAULT_GAS_RELAY_HUB),
    },
    RegistryEntry {
        alias: "goerli",
        node_url: "https://eth-goerli.gateway.pokt.network/v1/lb/61391c2ca2d82e0037c1afc2",
        chain_id: "5",
        gas_relay_hub: None,
    },
    RegistryEntry {
        alias: "ubiq",
        node_url: "https://rpc1.ubiqscan.io",
        chain_id: "8",
        gas_relay_hub: None,
    },
    RegistryEntry {
        alias: "thundercoreTestnet",
        node_url: "https://testnet-rpc.thundercore.com:8544",
        chain_id: "18",
        gas_relay_hub: None,
    },
    RegistryEntry {
        alias: "orchid",
        node_url: "https://public-node.rsk.co",
        chain_id: "30",
        gas_relay_hub: None,
    },
    RegistryEntry {
        alias: "orchidTestnet",
        node_url: "https://public-node.testnet.rsk.co",
        chain_id: "31",
        gas_relay_hub: None,
    },
    RegistryEntry {
        alias: "kovan",
        node_url: "https://kovan.infura.io/v3/faa4639b090f46499f29d894da0551a0",
        chain_id: "42",
        gas_relay_hub: Some(DEFAULT_GAS_RELAY_HUB),
    },
    RegistryEntry {
        alias: "classic",
        node_url: "https://ethereumclassic.network",
        chain_id: "61",
        gas_relay_hub: None,
    },
    RegistryEntry {
        alias: "sokol",
        node_url: "https://sokol.poa.network",
        chain_id: "77",
        gas_relay_hub: None,
    },
    RegistryEntry {
        alias: "core",
        node_url: "https://core.poa.network",
        chain_id: "99",
        gas_relay_hub: None,
    },
    RegistryEntry {
        alias: "xdai",
        node_url: "https://poa-xdai.gateway.pokt.network/v1/lb/61391c7ea2d82e0037c1b20f",
        chain_id: "100",
        gas_relay_hub: Some(DEFAULT_GAS_RELAY_HUB),
    },
    RegistryEntry {
        alias: "thundercore",
        node_url: "https://mainnet-rpc.thundercore.com",
        chain_id: "108",
        gas_relay_hub: None,
    },
    RegistryEntry {
        alias: "fuse",
        node_url: "https://fuse-mainnet.gateway.pokt.network/v1/lb/61391ccca2d82e0037c1b46e",
        chain_id: "122",
        gas_relay_hub: None,
    },
    RegistryEntry {
        alias: "lightstreams",
        node_url: "https://node.mainnet.lightstreams.io",
        chain_id: "163",
        gas_relay_hub: None,
    },
    RegistryEntry {
        alias: "matic",
        node_url: "https://poly-mainnet.gateway.pokt.network/v1/lb/61391e68a2d82e0037c1b9e7",
        chain_id: "137",
        gas_relay_hub: None,
    },
    RegistryEntry {
        alias: "maticMumbai",
        node_url: "https://rpc-mumbai.matic.today",
        chain_id: "80001",
        gas_relay_hub: None,
    },
    RegistryEntry {
        alias: "maticAlpha",
        node_url: "https://alpha.ethereum.matic.network",
        chain_id: "4626",
        gas_relay_hub: None,
    },
    RegistryEntry {
        alias: "maticTestnet",
        node_url: "https://testnet2.matic.network",
        chain_id: "8995",
        gas_relay_hub: None,
    },
];

pub fn known_aliases() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|e| e.alias)
}

/// Registry descriptor for `alias`, gas relay hub included when defined.
pub fn lookup(alias: &str) -> Option<NetworkDescriptor> {
    REGISTRY.iter().find(|e| e.alias == alias).map(|e| {
        let mut descriptor = NetworkDescriptor::new(e.node_url, Some(e.chain_id));
        descriptor.gas_relay_hub_address = e.gas_relay_hub.map(str::to_owned);
        descriptor
    })
}

/// Resolves and validates a network.
///
/// Aliases resolve through the registry; explicit descriptors pass through.
/// A gas relay hub is kept for an alias only when `gas_relay` is requested.
/// With `verified`, the node URL comes from the registry entry of the
/// verified chain.
pub fn resolve_network(
    network: &NetworkInput,
    gas_relay: bool,
    verified: Option<&VerifiedParams>,
) -> Result<NetworkDescriptor, SdkError> {
    let mut descriptor = match network {
        NetworkInput::Alias(alias) => lookup(alias).ok_or_else(|| {
            SdkError::NetworkDescriptor(format!("illegal 'network' parameter: unknown alias {alias:?}"))
        })?,
        NetworkInput::Descriptor(d) => d.clone(),
    };

    if let Some(params) = verified {
        if params.chain.is_empty() || params.request_count == 0 || params.min_deposit == 0 {
            return Err(SdkError::NetworkDescriptor(
                "a verified relay config with chain, requestCount and minDeposit is required"
                    .to_owned(),
            ));
        }
        if !VERIFIED_CHAINS.contains(&params.chain.as_str()) {
            return Err(SdkError::NetworkDescriptor(format!(
                "verified relay supports only {}; got {:?}",
                VERIFIED_CHAINS.join(", "),
                params.chain
            )));
        }
        let chain = lookup(&params.chain).ok_or_else(|| {
            SdkError::NetworkDescriptor(format!("no registry entry for {:?}", params.chain))
        })?;
        descriptor.node_url = chain.node_url;
        descriptor.chain_id = chain.chain_id;
    }

    if descriptor.node_url.trim().is_empty() {
        return Err(SdkError::NetworkDescriptor("'nodeUrl' is required".to_owned()));
    }
    descriptor.protocol = NodeProtocol::from_url(&descriptor.node_url).ok_or_else(|| {
        SdkError::NetworkDescriptor(format!(
            "unsupported nodeUrl scheme in {:?}",
            descriptor.node_url
        ))
    })?;

    if gas_relay && descriptor.gas_relay_hub_address.is_none() {
        return Err(SdkError::NetworkDescriptor(format!(
            "can't find default gas relay hub for {network}"
        )));
    }
    if matches!(network, NetworkInput::Alias(_)) && !gas_relay {
        descriptor.gas_relay_hub_address = None;
    }

    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_alias_resolves_with_node_url() {
        for alias in known_aliases() {
            let d = resolve_network(&alias.into(), false, None).expect("alias resolves");
            assert!(!d.node_url.is_empty(), "{alias} has empty nodeUrl");
            assert!(d.gas_relay_hub_address.is_none(), "{alias} leaked hub");
        }
    }

    #[test]
    fn hub_present_iff_requested_and_defined() {
        for alias in known_aliases() {
            let defined = lookup(alias).and_then(|d| d.gas_relay_hub_address).is_some();
            match resolve_network(&alias.into(), true, None) {
                Ok(d) => {
                    assert!(defined);
                    assert!(d.gas_relay_hub_address.is_some());
                }
                Err(SdkError::NetworkDescriptor(msg)) => {
                    assert!(!defined);
                    assert!(msg.contains("gas relay hub"));
                }
                Err(other) => panic!("unexpected error {other}"),
            }
        }
    }

    #[test]
    fn mainnet_scenario() {
        let d = resolve_network(&"mainnet".into(), false, None).expect("mainnet");
        assert_eq!(
            d.node_url,
            "https://eth-mainnet.gateway.pokt.network/v1/lb/61391a62a2d82e0037c1a204"
        );
        assert_eq!(d.chain_id.as_deref(), Some("1"));
    }

    #[test]
    fn unknown_alias_and_empty_url() {
        assert!(matches!(
            resolve_network(&"atlantis".into(), false, None),
            Err(SdkError::NetworkDescriptor(_))
        ));
        let empty = NetworkDescriptor::new("", Some("1"));
        assert!(matches!(
            resolve_network(&empty.into(), false, None),
            Err(SdkError::NetworkDescriptor(_))
        ));
    }

    #[test]
    fn explicit_descriptor_keeps_its_hub() {
        let d = NetworkDescriptor::new("http://localhost:8545", Some("1337"))
            .with_gas_relay_hub("0x01");
        let resolved = resolve_network(&d.clone().into(), false, None).expect("pass-through");
        assert_eq!(resolved, d);
    }

    #[test]
    fn verified_requires_supported_chain() {
        let params = VerifiedParams {
            chain: "xdai".to_owned(),
            request_count: 1,
            min_deposit: 1,
        };
        assert!(resolve_network(&"mainnet".into(), false, Some(&params)).is_err());

        let params = VerifiedParams {
            chain: "goerli".to_owned(),
            request_count: 2,
            min_deposit: 1,
        };
        let d = resolve_network(&"mainnet".into(), false, Some(&params)).expect("goerli");
        assert_eq!(d.chain_id.as_deref(), Some("5"));
        assert!(d.node_url.contains("goerli"));
    }
}
