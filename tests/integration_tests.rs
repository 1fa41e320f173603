//! End-to-end ledger scenarios

use utxo_consensus::transaction::output_id;
use utxo_consensus::*;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config() -> ChainConfig {
    ChainConfig::default().with_difficulty(2)
}

fn signed_transfer(
    ledger: &Ledger,
    from: &Wallet,
    to: &str,
    amount: Amount,
) -> anyhow::Result<Transaction> {
    let (inputs, _) = ledger.get_spendable_outputs(from.address(), amount);
    anyhow::ensure!(!inputs.is_empty(), "no spendable outputs");
    let mut tx = TransferTransaction::new(from, to, amount, inputs)?;
    tx.sign(from)?;
    anyhow::ensure!(tx.process_transaction(ledger.utxos())?.is_valid());
    Ok(tx.into())
}

#[test]
fn test_mint_and_transfer_scenario() -> anyhow::Result<()> {
    init_logger();
    let x = Wallet::generate();
    let y = Wallet::generate();
    let mut ledger = Ledger::new("scenario", config())?;

    let genesis = &ledger.chain()[0];
    assert_eq!(genesis.header.index, 0);
    assert!(genesis.transactions.is_empty());
    assert_eq!(genesis.header.previous_hash, "0");

    // block 1: coinbase only
    let block1 = ledger.mine_block(vec![], x.address())?.expect("block 1 accepted");
    assert_eq!(block1.transactions.len(), 1);
    assert_eq!(ledger.get_balance(x.address()), MINING_REWARD);

    // block 2: X pays Y k < R
    let k = 3;
    let tx = signed_transfer(&ledger, &x, y.address(), k)?;
    let tx_id = tx.transaction_id().to_string();
    ledger.mine_block(vec![tx], "miner")?.expect("block 2 accepted");

    assert_eq!(ledger.get_balance(x.address()), MINING_REWARD - k);
    assert_eq!(ledger.get_balance(y.address()), k);

    let coinbase_output = block1.transactions[0].outputs()[0].id.clone();
    assert!(!ledger.utxos().contains_key(&coinbase_output));
    assert_eq!(ledger.utxos()[&output_id(&tx_id, 0)].recipient_address, y.address());
    assert_eq!(ledger.utxos()[&output_id(&tx_id, 1)].recipient_address, x.address());
    // the two transfer outputs plus block 2's coinbase
    assert_eq!(ledger.utxos().len(), 3);
    Ok(())
}

#[test]
fn test_every_block_meets_difficulty() -> anyhow::Result<()> {
    init_logger();
    let mut ledger = Ledger::new("pow", config())?;
    for _ in 0..3 {
        ledger.mine_block(vec![], "miner")?;
    }

    for block in &ledger.chain()[1..] {
        assert_eq!(block.hash, block.calculate_hash()?);
        assert!(block.hash.starts_with("00"));
    }
    Ok(())
}

#[test]
fn test_utxo_set_size_tracks_inputs_and_outputs() -> anyhow::Result<()> {
    init_logger();
    let alice = Wallet::generate();
    let mut ledger = Ledger::new("sizes", config())?;
    ledger.mine_block(vec![], alice.address())?;
    ledger.mine_block(vec![], alice.address())?;

    let tx = signed_transfer(&ledger, &alice, "bob", 15)?;
    let spent = tx.input_ids().len();
    let created = tx.outputs().len() + 1;
    let before = ledger.utxos().len();

    ledger.mine_block(vec![tx], "miner")?.expect("block accepted");
    assert_eq!(ledger.utxos().len(), before - spent + created);
    Ok(())
}

#[test]
fn test_double_spend_never_reaches_chain() -> anyhow::Result<()> {
    init_logger();
    let alice = Wallet::generate();
    let mut ledger = Ledger::new("double", config())?;
    ledger.mine_block(vec![], alice.address())?;

    let first = signed_transfer(&ledger, &alice, "bob", 10)?;
    let second = signed_transfer(&ledger, &alice, "carol", 10)?;

    // both in one block
    assert!(ledger.mine_block(vec![first.clone(), second.clone()], "miner")?.is_none());
    assert_eq!(ledger.chain_len(), 2);

    // one after the other
    ledger.mine_block(vec![first], "miner")?.expect("first spend accepted");
    assert!(ledger.mine_block(vec![second], "miner")?.is_none());
    assert_eq!(ledger.get_balance("bob"), 10);
    assert_eq!(ledger.get_balance("carol"), 0);
    Ok(())
}

#[test]
fn test_is_chain_valid_is_idempotent() -> anyhow::Result<()> {
    init_logger();
    let mut ledger = Ledger::new("idem", config())?;
    ledger.mine_block(vec![], "miner")?;
    ledger.mine_block(vec![], "miner")?;

    let first = ledger.is_chain_valid(None)?;
    for _ in 0..3 {
        assert_eq!(ledger.is_chain_valid(None)?, first);
    }
    assert!(first);
    Ok(())
}

#[test]
fn test_config_from_json_drives_ledger() -> anyhow::Result<()> {
    init_logger();
    let config = ChainConfig::from_json(r#"{"difficulty": 1, "mining_reward": 25}"#)?;
    let mut ledger = Ledger::new("configured", config)?;
    ledger.mine_block(vec![], "miner")?;
    assert_eq!(ledger.get_balance("miner"), 25);
    Ok(())
}
