use census::store::{ChainStore, MIN_PROTOCOL_VERSION};
use census::trie::Trie;
use census::address::LEGACY_ACCOUNT;
use census::Address;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let uri = std::env::args()
        .nth(1)
        .ok_or("usage: inspect-store <store-uri>")?;

    let store = ChainStore::open(&uri)?;
    println!("Store: {}", store.path().display());

    let chain_id = store.canonical_chain_id()?;
    println!("Canonical chain: {}", hex::encode(chain_id));

    let tip = store.tip()?;
    println!("\n=== TIP ===");
    println!("Index: {}", tip.index);
    println!("Hash: {}", hex::encode(tip.hash));
    println!("Protocol version: {}", tip.protocol_version);
    println!("State root: {}", hex::encode(tip.state_root_hash));
    println!("Timestamp: {}", tip.timestamp);

    println!("\n=== TRIE METADATA ===");
    match store.trie_metadata(&tip.state_root_hash)? {
        Some(metadata) => println!("Version: {}", metadata.version),
        None => println!("Version: NOT FOUND"),
    }
    if tip.protocol_version < MIN_PROTOCOL_VERSION {
        println!("Protocol version below {}, census commands will refuse this store", MIN_PROTOCOL_VERSION);
        return Ok(());
    }

    let world = match store.world_trie(&tip) {
        Ok(world) => world,
        Err(e) => {
            println!("World trie unusable: {}", e);
            return Ok(());
        }
    };

    println!("World root: {}", hex::encode(world.root()));
    let legacy = world.account_trie(&LEGACY_ACCOUNT)?;
    println!("Legacy account root: {}", hex::encode(legacy.root()));

    println!("\n=== ACCOUNTS ===");
    let mut accounts = 0u64;
    let mut other = 0u64;
    for entry in world.as_trie().iterate_values() {
        let (key, value) = entry?;
        match Address::from_slice(&key) {
            Ok(address) if accounts < 10 => {
                println!("{} -> {}", address, value);
                accounts += 1;
            }
            Ok(_) => accounts += 1,
            Err(_) => other += 1,
        }
    }
    println!("Total accounts: {}", accounts);
    if other > 0 {
        println!("Non-address keys: {}", other);
    }

    Ok(())
}
