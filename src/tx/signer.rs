//! Local transaction signing

use crate::error::{SpammerError, SpammerResult};

use ethers::prelude::*;
use ethers::signers::Signer as _;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::utils::keccak256;

/// A signed, ready-to-broadcast transaction
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub nonce: u64,
    /// keccak256 of the raw payload, i.e. the hash the chain will assign
    pub hash: H256,
    /// EIP-2718 envelope: `0x02 || rlp(signed fields)`
    pub raw: Bytes,
    pub request: Eip1559TransactionRequest,
}

/// Holds the account's key; read-only for the lifetime of a run
#[derive(Debug, Clone)]
pub struct Signer {
    wallet: LocalWallet,
}

impl Signer {
    pub fn new(wallet: LocalWallet) -> Self {
        Self { wallet }
    }

    /// Parse a hex private key, with or without `0x`
    pub fn from_private_key(key: &str) -> SpammerResult<Self> {
        let wallet = key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| SpammerError::Wallet(format!("Invalid private key: {}", e)))?;
        Ok(Self::new(wallet))
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Sign an EIP-1559 request. The request must carry its nonce and chain id.
    pub fn sign(&self, request: Eip1559TransactionRequest) -> SpammerResult<SignedTransaction> {
        let nonce = request
            .nonce
            .ok_or_else(|| SpammerError::Internal("Cannot sign a request without a nonce".into()))?
            .as_u64();
        if request.chain_id.is_none() {
            return Err(SpammerError::Internal(
                "Cannot sign a request without a chain id".into(),
            ));
        }

        let typed = TypedTransaction::Eip1559(request.clone());
        let signature = self
            .wallet
            .sign_transaction_sync(&typed)
            .map_err(|e| SpammerError::Wallet(e.to_string()))?;
        let raw = typed.rlp_signed(&signature);

        Ok(SignedTransaction {
            nonce,
            hash: H256::from(keccak256(&raw)),
            raw,
            request,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::DEV_KEY;

    fn request(nonce: u64) -> Eip1559TransactionRequest {
        Eip1559TransactionRequest::new()
            .to(Address::repeat_byte(0x11))
            .value(1_000u64)
            .nonce(nonce)
            .gas(21_000u64)
            .max_fee_per_gas(2_100_000_000u64)
            .max_priority_fee_per_gas(100_000_000u64)
            .chain_id(167_000u64)
    }

    #[test]
    fn test_address_from_key() {
        let signer = Signer::from_private_key(DEV_KEY).unwrap();
        assert_eq!(
            signer.address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
                .parse::<Address>()
                .unwrap()
        );
        // Same key without prefix
        let bare = Signer::from_private_key(DEV_KEY.trim_start_matches("0x")).unwrap();
        assert_eq!(bare.address(), signer.address());
    }

    #[test]
    fn test_invalid_key() {
        assert!(matches!(
            Signer::from_private_key("0x1234"),
            Err(SpammerError::Wallet(_))
        ));
    }

    #[test]
    fn test_signature_recovers_sender() {
        let signer = Signer::from_private_key(DEV_KEY).unwrap();
        let signed = signer.sign(request(7)).unwrap();

        assert_eq!(signed.nonce, 7);
        assert_eq!(signed.raw[0], 0x02);
        assert_eq!(signed.hash, H256::from(keccak256(&signed.raw)));

        // RFC 6979 signatures are deterministic, so re-signing reproduces the payload
        let typed = TypedTransaction::Eip1559(signed.request.clone());
        let signature = signer.wallet.sign_transaction_sync(&typed).unwrap();
        assert_eq!(typed.rlp_signed(&signature), signed.raw);
        assert_eq!(signature.recover(typed.sighash()).unwrap(), signer.address());
    }

    #[test]
    fn test_distinct_nonces_distinct_hashes() {
        let signer = Signer::from_private_key(DEV_KEY).unwrap();
        let a = signer.sign(request(0)).unwrap();
        let b = signer.sign(request(1)).unwrap();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_requires_nonce_and_chain_id() {
        let signer = Signer::from_private_key(DEV_KEY).unwrap();
        let mut no_nonce = request(0);
        no_nonce.nonce = None;
        assert!(matches!(signer.sign(no_nonce), Err(SpammerError::Internal(_))));

        let mut no_chain = request(0);
        no_chain.chain_id = None;
        assert!(matches!(signer.sign(no_chain), Err(SpammerError::Internal(_))));
    }
}
