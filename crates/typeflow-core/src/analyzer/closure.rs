//! Call-chain identity for context-sensitive closure units.

use smallvec::SmallVec;

use crate::ast::CallSite;

/// Ordered, bounded sequence of call-site identifiers. Used purely as an
/// identity key distinguishing closure instantiations of one canonical
/// function; two chains are the same context iff they compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CallChain {
    sites: SmallVec<[CallSite; 4]>,
}

impl CallChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(site: CallSite) -> Self {
        CallChain {
            sites: SmallVec::from_slice(&[site]),
        }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Chain extended by one call site, or `None` once `limit` is reached.
    pub fn extended(&self, site: CallSite, limit: usize) -> Option<CallChain> {
        if self.sites.len() >= limit {
            return None;
        }
        let mut sites = self.sites.clone();
        sites.push(site);
        Some(CallChain { sites })
    }

    pub fn sites(&self) -> &[CallSite] {
        &self.sites
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_respects_limit() {
        let chain = CallChain::single(1);
        let chain = chain.extended(2, 3).expect("under limit");
        let chain = chain.extended(3, 3).expect("at limit boundary");
        assert_eq!(chain.sites(), &[1, 2, 3]);
        assert!(chain.extended(4, 3).is_none());
    }

    #[test]
    fn test_chains_are_identity_keys() {
        let a = CallChain::single(1).extended(2, 8).unwrap();
        let b = CallChain::single(1).extended(2, 8).unwrap();
        let c = CallChain::single(2).extended(1, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
