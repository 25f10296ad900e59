//! Height-indexed chain parameters consulted by the name subsystem.

use crate::MEMPOOL_HEIGHT;
use bitcoin::{Amount, Network, Txid};
use std::collections::HashMap;

/// How a historic-bug transaction is treated during application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BugType {
    /// The transaction is valid and all name operations are performed.
    FullyApply,
    /// The name operations are not applied, but the outputs stay in the
    /// UTXO set.  Needed for the first "name stealing" output, which is
    /// spent again by the second one.
    InUtxo,
    /// The name operations are not applied and the outputs are marked
    /// spent immediately.
    FullyIgnore,
}

/// Chain parameters for the name subsystem.
///
/// Constructed per network; the historic-bug table is non-empty only on
/// the production chain.
#[derive(Debug, Clone)]
pub struct ChainParams {
    network: Network,
    historic_bugs: HashMap<(u32, Txid), BugType>,
}

impl ChainParams {
    /// Constructs the parameters for the given network.
    pub fn new(network: Network) -> Self {
        let mut params = Self {
            network,
            historic_bugs: HashMap::new(),
        };

        if network == Network::Bitcoin {
            /* Transactions with name outputs but a non-name tx version.
               They contain NAME_NEWs, which are fine, and also
               NAME_FIRSTUPDATEs that the legacy client never interpreted,
               so neither do we.  */
            params.add_bug(
                98423,
                "bff3ed6873e5698b97bf0c28c29302b59588590b747787c7d1ef32decdabe0d1",
                BugType::FullyIgnore,
            );
            params.add_bug(
                98424,
                "e9b211007e5cac471769212ca0f47bb066b81966a8e541d44acf0f8a1bd24976",
                BugType::FullyIgnore,
            );
            params.add_bug(
                98425,
                "8aa2b0fc7d1033de28e0192526765a72e9df0c635f7305bdc57cb451ed01a4ca",
                BugType::FullyIgnore,
            );

            /* Both a NAME_NEW and a NAME_FIRSTUPDATE as inputs, accepted
               due to the "argument concatenation" bug.  Processing the
               NAME_UPDATE output that builds on the FIRSTUPDATE input is
               fine.  */
            params.add_bug(
                99381,
                "774d4c446cecfc40b1c02fdc5a13be6d2007233f9d91daefab6b3c2e70042f05",
                BugType::FullyApply,
            );

            /* The "name stealing" transactions.  */
            params.add_bug(
                139872,
                "2f034f2499c136a2c5a922ca4be65c1292815c753bbb100a2a26d5ad532c3919",
                BugType::InUtxo,
            );
            params.add_bug(
                139936,
                "c3e76d5384139228221cce60250397d1b87adf7366086bc8d6b5e6eee03c55c7",
                BugType::FullyIgnore,
            );
        }

        params
    }

    fn add_bug(&mut self, height: u32, txid: &str, bug_type: BugType) {
        let txid: Txid = txid.parse().expect("hard-coded txid literal is valid; qed");
        self.historic_bugs.insert((height, txid), bug_type);
    }

    /// Register an additional allowlist entry.
    ///
    /// Production networks get their table from [`ChainParams::new`];
    /// this exists so regression tests can exercise the bug handling with
    /// synthetic transactions.
    pub fn add_historic_bug(&mut self, height: u32, txid: Txid, bug_type: BugType) {
        self.historic_bugs.insert((height, txid), bug_type);
    }

    /// The network these parameters describe.
    pub fn network(&self) -> Network {
        self.network
    }

    /// Look up a transaction in the historic-bug allowlist.
    pub fn historic_bug(&self, txid: &Txid, height: u32) -> Option<BugType> {
        self.historic_bugs.get(&(height, *txid)).copied()
    }

    /// Number of blocks after which a name registered or updated at some
    /// height expires.
    ///
    /// It is assumed (by the expire engine) that `n - depth(n)` is
    /// non-decreasing in `n`: this is the update height up to which names
    /// expire at height `n`.
    pub fn name_expiration_depth(&self, height: u32) -> u32 {
        match self.network {
            Network::Regtest => 30,
            _ => {
                if height < 24_000 {
                    12_000
                } else if height < 48_000 {
                    height - 12_000
                } else {
                    36_000
                }
            }
        }
    }

    /// Minimum amount that must be locked in a name-coin output mined at
    /// the given height.  Outputs below the floor are "greedy names".
    pub fn min_name_coin_amount(&self, _height: u32) -> Amount {
        Amount::from_sat(1_000_000)
    }

    /// Default `-checknamedb` verification cadence: `-1` disabled, `0`
    /// every flush, `k > 0` every k-th block.
    pub fn default_check_name_db(&self) -> i32 {
        match self.network {
            Network::Regtest => 0,
            _ => -1,
        }
    }

    /// Whether a name last updated at `prev_height` is expired at
    /// `height`.
    ///
    /// Coins still in the mempool (either side at `MEMPOOL_HEIGHT`) are
    /// never expired; callers judging mempool admission pass the
    /// next-block height instead of the sentinel.
    pub fn name_expired(&self, prev_height: u32, height: u32) -> bool {
        if prev_height == MEMPOOL_HEIGHT || height == MEMPOOL_HEIGHT {
            return false;
        }

        u64::from(prev_height) + u64::from(self.name_expiration_depth(height)) <= u64::from(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_expiration_schedule() {
        let params = ChainParams::new(Network::Bitcoin);
        assert_eq!(params.name_expiration_depth(0), 12_000);
        assert_eq!(params.name_expiration_depth(23_999), 12_000);
        assert_eq!(params.name_expiration_depth(24_000), 12_000);
        assert_eq!(params.name_expiration_depth(36_000), 24_000);
        assert_eq!(params.name_expiration_depth(47_999), 35_999);
        assert_eq!(params.name_expiration_depth(48_000), 36_000);
        assert_eq!(params.name_expiration_depth(1_000_000), 36_000);
    }

    #[test]
    fn absolute_expiration_height_is_monotonic() {
        // n - depth(n) must never decrease across the schedule steps.
        let params = ChainParams::new(Network::Bitcoin);
        let mut last = 0i64;
        for h in (12_000..60_000).step_by(100) {
            let cur = i64::from(h) - i64::from(params.name_expiration_depth(h));
            assert!(cur >= last, "absolute expiration height decreased at {h}");
            last = cur;
        }
    }

    #[test]
    fn expiry_boundaries() {
        let params = ChainParams::new(Network::Bitcoin);
        assert!(!params.name_expired(100_000, 135_999));
        assert!(params.name_expired(100_000, 136_000));
        assert!(!params.name_expired(crate::MEMPOOL_HEIGHT, 136_000));
        assert!(!params.name_expired(100_000, crate::MEMPOOL_HEIGHT));
    }

    #[test]
    fn historic_bugs_only_on_mainnet() {
        let main = ChainParams::new(Network::Bitcoin);
        let txid: Txid = "2f034f2499c136a2c5a922ca4be65c1292815c753bbb100a2a26d5ad532c3919"
            .parse()
            .unwrap();
        assert_eq!(main.historic_bug(&txid, 139_872), Some(BugType::InUtxo));
        assert_eq!(main.historic_bug(&txid, 139_873), None);

        let regtest = ChainParams::new(Network::Regtest);
        assert_eq!(regtest.historic_bug(&txid, 139_872), None);
        assert_eq!(regtest.name_expiration_depth(1_000), 30);
        assert_eq!(regtest.default_check_name_db(), 0);
    }
}
