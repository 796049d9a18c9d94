//! One-shot subcommands that edit the saved blocklist without opening a tunnel.

use color_eyre::Result;

use tunblock::constants;
use tunblock::core::BlocklistStore;

/// `tunblock block <ip>`
pub fn block(store: &BlocklistStore, ip: &str) -> Result<()> {
    let mut set = store.load()?;
    if set.insert(ip.trim())? {
        store.save(&set)?;
        println!("{}{}", constants::CLI_MSG_BLOCKED, ip.trim());
    } else {
        println!("{}{}", constants::CLI_MSG_ALREADY_BLOCKED, ip.trim());
    }
    Ok(())
}

/// `tunblock unblock <ip>`
pub fn unblock(store: &BlocklistStore, ip: &str) -> Result<()> {
    let mut set = store.load()?;
    if set.remove(ip.trim())? {
        store.save(&set)?;
        println!("{}{}", constants::CLI_MSG_UNBLOCKED, ip.trim());
    } else {
        println!("{}{}", constants::CLI_MSG_NOT_BLOCKED, ip.trim());
    }
    Ok(())
}

/// `tunblock list`
pub fn list(store: &BlocklistStore) -> Result<()> {
    let set = store.load()?;
    println!("{}{}", constants::CLI_MSG_STORE_PATH, store.path().display());
    if set.is_empty() {
        println!("{}", constants::CLI_MSG_EMPTY);
    }
    for ip in &set {
        println!("  • {ip}");
    }
    Ok(())
}
