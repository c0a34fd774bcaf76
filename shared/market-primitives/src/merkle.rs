//! Sorted-pair keccak Merkle tree, compatible with OpenZeppelin's `MerkleProof.verify`.
//!
//! - leaf   = `keccak256(account[20] || amount[32])`
//! - parent = `keccak256(min(a, b) || max(a, b))`
//! - an unpaired trailing node is carried up a level unchanged
//!
//! Leaves are laid out in ascending address order; the leaf index is that position.

use std::collections::BTreeMap;

use alloy_primitives::{keccak256, Address, B256, U256};

pub fn leaf_hash(account: Address, amount: U256) -> B256 {
    let mut buf = Vec::with_capacity(20 + 32);
    buf.extend_from_slice(account.as_slice());
    buf.extend_from_slice(&amount.to_be_bytes::<32>());
    keccak256(buf)
}

pub fn hash_pair(a: B256, b: B256) -> B256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(lo.as_slice());
    buf[32..].copy_from_slice(hi.as_slice());
    keccak256(buf)
}

/// Recompute the root from a leaf and its proof and compare.
pub fn verify(root: B256, leaf: B256, proof: &[B256]) -> bool {
    proof.iter().fold(leaf, |acc, sibling| hash_pair(acc, *sibling)) == root
}

#[derive(Clone, Debug)]
pub struct MerkleTree {
    accounts: Vec<(Address, U256)>,
    /// `levels[0]` are the leaves, the last level holds the root alone.
    levels: Vec<Vec<B256>>,
}

impl MerkleTree {
    /// Build from an address -> amount map. Returns `None` for an empty set.
    pub fn new(entries: &BTreeMap<Address, U256>) -> Option<Self> {
        if entries.is_empty() {
            return None;
        }
        let accounts: Vec<(Address, U256)> = entries.iter().map(|(a, v)| (*a, *v)).collect();
        let leaves: Vec<B256> = accounts.iter().map(|(a, v)| leaf_hash(*a, *v)).collect();

        let mut levels = vec![leaves];
        while levels[levels.len() - 1].len() > 1 {
            let current = &levels[levels.len() - 1];
            let next: Vec<B256> = current
                .chunks(2)
                .map(|pair| match pair {
                    [a, b] => hash_pair(*a, *b),
                    [single] => *single,
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            levels.push(next);
        }
        Some(Self { accounts, levels })
    }

    pub fn root(&self) -> B256 {
        self.levels[self.levels.len() - 1][0]
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn index_of(&self, account: Address) -> Option<usize> {
        self.accounts.binary_search_by(|(a, _)| a.cmp(&account)).ok()
    }

    pub fn amount_at(&self, index: usize) -> Option<U256> {
        self.accounts.get(index).map(|(_, v)| *v)
    }

    /// Sibling path from the leaf at `index` up to (excluding) the root.
    pub fn proof(&self, index: usize) -> Option<Vec<B256>> {
        if index >= self.len() {
            return None;
        }
        let mut proof = Vec::new();
        let mut i = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = i ^ 1;
            if sibling < level.len() {
                proof.push(level[sibling]);
            }
            i /= 2;
        }
        Some(proof)
    }

    /// `(amount, proof, leaf_index)` for `account`, if it is in the set.
    pub fn proof_for(&self, account: Address) -> Option<(U256, Vec<B256>, usize)> {
        let index = self.index_of(account)?;
        let proof = self.proof(index)?;
        Some((self.accounts[index].1, proof, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(n: u8) -> BTreeMap<Address, U256> {
        (1..=n)
            .map(|i| (Address::repeat_byte(i), U256::from(i as u64 * 10)))
            .collect()
    }

    #[test]
    fn every_leaf_proves_for_various_sizes() {
        for n in 1..=9u8 {
            let set = entries(n);
            let tree = MerkleTree::new(&set).unwrap();
            for (account, amount) in &set {
                let (got_amount, proof, index) = tree.proof_for(*account).unwrap();
                assert_eq!(got_amount, *amount);
                assert_eq!(tree.amount_at(index), Some(*amount));
                assert!(verify(tree.root(), leaf_hash(*account, *amount), &proof), "n={n}");
            }
        }
    }

    #[test]
    fn absent_account_has_no_proof() {
        let tree = MerkleTree::new(&entries(4)).unwrap();
        assert!(tree.proof_for(Address::repeat_byte(0xee)).is_none());
    }

    #[test]
    fn tampered_amount_does_not_verify() {
        let tree = MerkleTree::new(&entries(5)).unwrap();
        let account = Address::repeat_byte(3);
        let (amount, proof, _) = tree.proof_for(account).unwrap();
        assert!(!verify(tree.root(), leaf_hash(account, amount + U256::from(1u8)), &proof));
    }

    #[test]
    fn single_leaf_root_is_the_leaf() {
        let tree = MerkleTree::new(&entries(1)).unwrap();
        assert_eq!(tree.root(), leaf_hash(Address::repeat_byte(1), U256::from(10u8)));
        assert_eq!(tree.proof(0).unwrap(), Vec::<B256>::new());
    }

    #[test]
    fn two_leaf_root_uses_sorted_pair() {
        let set = entries(2);
        let tree = MerkleTree::new(&set).unwrap();
        let a = leaf_hash(Address::repeat_byte(1), U256::from(10u8));
        let b = leaf_hash(Address::repeat_byte(2), U256::from(20u8));
        assert_eq!(tree.root(), hash_pair(a, b));
        assert_eq!(hash_pair(a, b), hash_pair(b, a));
    }

    #[test]
    fn empty_set_has_no_tree() {
        assert!(MerkleTree::new(&BTreeMap::new()).is_none());
    }
}
