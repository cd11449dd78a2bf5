//! The well-known genesis block.

use gossipchain_core::{crypto::SEED_LEN, Address, Block, Hash, Keypair, Transaction};

/// Seed of the genesis key. Its address receives the initial supply.
pub const GENESIS_SEED: [u8; SEED_LEN] = [
    0x4c, 0x17, 0x9d, 0xfc, 0x5d, 0x3b, 0x9f, 0x3c, 0x78, 0xe6, 0xb0, 0xa3, 0xa6, 0x4e, 0x28, 0x0a,
    0x4c, 0x09, 0x94, 0x79, 0x58, 0x95, 0x9a, 0x15, 0x0b, 0x59, 0xdd, 0x30, 0x23, 0xc0, 0x2b, 0xae,
];

/// Amount minted to the genesis address.
pub const GENESIS_AMOUNT: u64 = 1000;

/// The keypair derived from [`GENESIS_SEED`].
pub fn genesis_keypair() -> Keypair {
    Keypair::from_seed_bytes(&GENESIS_SEED)
}

/// Address credited by the genesis block.
pub fn genesis_address() -> Address {
    genesis_keypair().address()
}

/// Height-0 block: one no-input transaction minting [`GENESIS_AMOUNT`], signed by the genesis key.
pub fn genesis_block() -> Block {
    let keypair = genesis_keypair();
    let mint = Transaction::mint(GENESIS_AMOUNT, keypair.address());
    Block::new(Hash::ZERO, vec![mint]).signed(&keypair)
}
