// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Contract interfaces: the CASE ERC-20 token and ERC-1271 signature checks.

use std::str::FromStr;

use alloy::{
    primitives::{Address, U256},
    providers::Provider,
    sol,
};

use super::client::ChainError;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

sol! {
    #[sol(rpc)]
    interface IERC1271 {
        function isValidSignature(bytes32 hash, bytes signature) external view returns (bytes4 magicValue);
    }
}

/// `bytes4(keccak256("isValidSignature(bytes32,bytes)"))`
pub const ERC1271_MAGIC_VALUE: [u8; 4] = [0x16, 0x26, 0xba, 0x7e];

/// ERC-20 contract wrapper.
pub struct Erc20Contract<P> {
    contract: IERC20::IERC20Instance<P>,
}

impl<P: Provider + Clone> Erc20Contract<P> {
    pub fn new(provider: &P, contract_address: &str) -> Result<Self, ChainError> {
        let address = Address::from_str(contract_address)
            .map_err(|e| ChainError::InvalidAddress(e.to_string()))?;

        let contract = IERC20::new(address, provider.clone());

        Ok(Self { contract })
    }

    /// Raw token balance of an address.
    pub async fn balance_of(&self, wallet_address: Address) -> Result<U256, ChainError> {
        self.contract
            .balanceOf(wallet_address)
            .call()
            .await
            .map_err(|e| ChainError::ContractError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::keccak256;
    use alloy::sol_types::SolCall;

    #[test]
    fn magic_value_is_the_selector() {
        let selector = &keccak256("isValidSignature(bytes32,bytes)")[..4];
        assert_eq!(selector, ERC1271_MAGIC_VALUE);
        assert_eq!(IERC1271::isValidSignatureCall::SELECTOR, ERC1271_MAGIC_VALUE);
    }

    #[test]
    fn transfer_call_encoding() {
        let call = IERC20::transferCall {
            to: Address::ZERO,
            amount: U256::from(1u64),
        };
        let data = call.abi_encode();
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(data.len(), 4 + 32 + 32);
    }
}
