use std::{collections::BTreeMap, fs, path::PathBuf};

use alloy_primitives::{Address, B256, U256};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use market_primitives::{
    bytes::parse_hex_fixed, ecdsa::address_of, ids, merkle::MerkleTree, serde_u256, CastVote, CreateProposal, Domain,
    ExecuteZap, IndexSet, DOMAIN_NAME, DOMAIN_VERSION,
};
use serde_json::{json, Value};

mod bodies;
mod signer;

/// Produce signed intent bodies for the gasless relayer, and the ids / roots it derives.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the address of the signing key.
    Address(KeyArgs),
    /// Sign a CreateProposal intent.
    SignProposal {
        #[command(flatten)]
        ctx: SignArgs,
        #[arg(long)]
        market_id: B256,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, value_parser = serde_u256::parse)]
        stake_amount: U256,
    },
    /// Sign a CastVote intent.
    SignVote {
        #[command(flatten)]
        ctx: SignArgs,
        #[arg(long, value_parser = serde_u256::parse)]
        proposal_id: U256,
        /// Vote for (true) or against (false).
        #[arg(long, action = clap::ArgAction::Set)]
        support: bool,
        /// JSON file with the IDKit World ID proof to attach.
        #[arg(long)]
        world_id_proof: Option<PathBuf>,
    },
    /// Sign a Zap intent.
    SignZap {
        #[command(flatten)]
        ctx: SignArgs,
        #[arg(long, value_parser = serde_u256::parse)]
        wld_amount: U256,
        #[arg(long, value_parser = serde_u256::parse, default_value = "0")]
        min_usdc: U256,
        #[arg(long)]
        condition_id: B256,
        #[arg(long)]
        outcome_index: u64,
        #[arg(long, value_parser = serde_u256::parse, default_value = "0")]
        min_shares_out: U256,
    },
    /// Derive a condition id.
    ConditionId {
        /// 20-byte oracle address, hex.
        #[arg(long)]
        oracle: String,
        /// 32-byte question id, hex.
        #[arg(long)]
        question_id: String,
        #[arg(long, default_value_t = ids::BINARY_OUTCOME_SLOTS)]
        outcome_slots: u64,
    },
    /// Derive the collection id of an outcome set, optionally nested under a parent collection.
    CollectionId {
        #[arg(long)]
        parent_collection_id: Option<String>,
        #[arg(long)]
        condition_id: String,
        #[arg(long)]
        index_set: u64,
        #[arg(long, default_value_t = ids::BINARY_OUTCOME_SLOTS)]
        outcome_slots: u64,
    },
    /// Derive the position id of one outcome of a binary condition.
    PositionId {
        #[arg(long)]
        collateral: String,
        #[arg(long)]
        condition_id: String,
        #[arg(long)]
        outcome_index: u64,
    },
    /// Build a reward Merkle tree from a JSON object of address -> amount.
    MerkleRoot {
        #[arg(long)]
        leaves: PathBuf,
        /// Also print every leaf's proof.
        #[arg(long)]
        proofs: bool,
    },
}

#[derive(Args, Debug)]
struct KeyArgs {
    /// Path to a file containing the signer private key.
    #[arg(long, env = "PRIV_KEY_PATH", conflicts_with = "private_key")]
    private_key_path: Option<String>,

    /// Signer private key (hex string, 0x...).
    #[arg(long, env = "PKEY", conflicts_with = "private_key_path", hide_env_values = true)]
    private_key: Option<String>,
}

#[derive(Args, Debug)]
struct SignArgs {
    #[command(flatten)]
    key: KeyArgs,

    #[arg(long, env = "CHAIN_ID")]
    chain_id: u64,

    /// Entrypoint address (verifying contract of the typed-data domain).
    #[arg(long, env = "ENTRYPOINT_ADDRESS")]
    entrypoint: Address,

    #[arg(long, value_parser = serde_u256::parse)]
    nonce: U256,

    /// Unix timestamp after which the intent is void.
    #[arg(long)]
    deadline: u64,
}

impl SignArgs {
    fn domain(&self) -> Domain {
        Domain::new(DOMAIN_NAME, DOMAIN_VERSION, self.chain_id, self.entrypoint)
    }

    fn key(&self) -> Result<k256::ecdsa::SigningKey> {
        self.key.load()
    }
}

impl KeyArgs {
    fn load(&self) -> Result<k256::ecdsa::SigningKey> {
        signer::load_key(self.private_key_path.as_deref(), self.private_key.as_deref())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let out = run(cli.command)?;
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run(command: Command) -> Result<Value> {
    match command {
        Command::Address(key) => {
            let key = key.load()?;
            Ok(json!({ "address": address_of(key.verifying_key()) }))
        }
        Command::SignProposal {
            ctx,
            market_id,
            title,
            description,
            stake_amount,
        } => {
            let key = ctx.key()?;
            let intent = CreateProposal {
                proposer: address_of(key.verifying_key()),
                market_id,
                title,
                description,
                stake_amount,
                nonce: ctx.nonce,
                deadline: ctx.deadline,
            };
            let sig = signer::sign_intent(&key, &ctx.domain(), &intent)?;
            bodies::intent_body(&intent, &sig, ctx.chain_id)
        }
        Command::SignVote {
            ctx,
            proposal_id,
            support,
            world_id_proof,
        } => {
            let key = ctx.key()?;
            let intent = CastVote {
                proposal_id,
                support,
                voter: address_of(key.verifying_key()),
                nonce: ctx.nonce,
                deadline: ctx.deadline,
            };
            let sig = signer::sign_intent(&key, &ctx.domain(), &intent)?;
            let proof = match world_id_proof {
                Some(path) => Some(read_json(&path)?),
                None => None,
            };
            bodies::vote_body(&intent, &sig, ctx.chain_id, proof)
        }
        Command::SignZap {
            ctx,
            wld_amount,
            min_usdc,
            condition_id,
            outcome_index,
            min_shares_out,
        } => {
            IndexSet::for_outcome(outcome_index)?;
            let key = ctx.key()?;
            let intent = ExecuteZap {
                user: address_of(key.verifying_key()),
                wld_amount,
                min_usdc,
                condition_id,
                outcome_index,
                min_shares_out,
                nonce: ctx.nonce,
                deadline: ctx.deadline,
            };
            let sig = signer::sign_intent(&key, &ctx.domain(), &intent)?;
            bodies::intent_body(&intent, &sig, ctx.chain_id)
        }
        Command::ConditionId {
            oracle,
            question_id,
            outcome_slots,
        } => {
            let condition = ids::condition_id_from_slices(
                &parse_hex_fixed::<20>("oracle", &oracle)?,
                &parse_hex_fixed::<32>("questionId", &question_id)?,
                &U256::from(outcome_slots).to_be_bytes::<32>(),
            )?;
            Ok(json!({ "conditionId": condition }))
        }
        Command::CollectionId {
            parent_collection_id,
            condition_id,
            index_set,
            outcome_slots,
        } => {
            let index_set = U256::from(index_set);
            ids::validate_index_set(index_set, U256::from(outcome_slots))?;
            let parent = match parent_collection_id {
                Some(parent) => parse_hex_fixed::<32>("parentCollectionId", &parent)?,
                None => [0u8; 32],
            };
            let collection = ids::collection_id_from_slices(
                &parent,
                &parse_hex_fixed::<32>("conditionId", &condition_id)?,
                &index_set.to_be_bytes::<32>(),
            )?;
            Ok(json!({ "collectionId": collection }))
        }
        Command::PositionId {
            collateral,
            condition_id,
            outcome_index,
        } => {
            let outcome = IndexSet::for_outcome(outcome_index)?;
            let collection = ids::collection_id_from_slices(
                B256::ZERO.as_slice(),
                &parse_hex_fixed::<32>("conditionId", &condition_id)?,
                &outcome.as_u256().to_be_bytes::<32>(),
            )?;
            let position =
                ids::position_id_from_slices(&parse_hex_fixed::<20>("collateralToken", &collateral)?, collection.as_slice())?;
            Ok(json!({
                "positionId": position.to_string(),
                "collectionId": collection,
                "indexSet": outcome.as_u256().to_string(),
            }))
        }
        Command::MerkleRoot { leaves, proofs } => merkle_output(&read_json(&leaves)?, proofs),
    }
}

fn read_json(path: &PathBuf) -> Result<Value> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn merkle_output(leaves: &Value, with_proofs: bool) -> Result<Value> {
    let obj = leaves.as_object().context("leaves must be a JSON object of address -> amount")?;
    let mut entries = BTreeMap::new();
    for (addr, amount) in obj {
        let addr: Address = addr.parse().with_context(|| format!("invalid address {addr:?}"))?;
        let amount = match amount {
            Value::String(s) => serde_u256::parse(s).map_err(anyhow::Error::msg)?,
            Value::Number(n) => U256::from(n.as_u64().with_context(|| format!("amount for {addr} is not a u64"))?),
            other => bail!("amount for {addr} must be a string or integer, got {other}"),
        };
        if entries.insert(addr, amount).is_some() {
            bail!("duplicate leaf for {addr}");
        }
    }
    let tree = MerkleTree::new(&entries).context("no leaves given")?;

    let mut out = json!({ "merkleRoot": tree.root(), "leaves": tree.len() });
    if with_proofs {
        let mut proofs = serde_json::Map::new();
        for addr in entries.keys() {
            if let Some((amount, proof, index)) = tree.proof_for(*addr) {
                proofs.insert(
                    format!("{addr:#x}"),
                    json!({ "amount": amount.to_string(), "leafIndex": index, "proof": proof }),
                );
            }
        }
        out["proofs"] = Value::Object(proofs);
    }
    Ok(out)
}
