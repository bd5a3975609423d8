use soroban_sdk::{token, Address, Env};

/// Moves escrowed value in and out of the contract.
///
/// Implementations must abort the whole invocation when a balance is
/// insufficient; the engine never checks a return value.
pub trait EscrowTransfer {
    /// Pulls `amount` from `from` into the escrow pool.
    fn deposit(&self, from: &Address, amount: i128);
    /// Pays accrued value out to a recipient.
    fn transfer(&self, to: &Address, amount: i128);
    /// Returns unearned value to a sender.
    fn refund(&self, to: &Address, amount: i128);
}

/// Escrow held as a token balance on the contract's own address.
pub struct TokenEscrow {
    env: Env,
    token: Address,
}

impl TokenEscrow {
    pub fn new(env: &Env, token: Address) -> Self {
        Self {
            env: env.clone(),
            token,
        }
    }

    fn client(&self) -> token::Client<'_> {
        token::Client::new(&self.env, &self.token)
    }
}

impl EscrowTransfer for TokenEscrow {
    fn deposit(&self, from: &Address, amount: i128) {
        // Panics inside the token contract on insufficient balance, which
        // rolls back the whole invocation.
        self.client()
            .transfer(from, &self.env.current_contract_address(), &amount);
    }

    fn transfer(&self, to: &Address, amount: i128) {
        self.client()
            .transfer(&self.env.current_contract_address(), to, &amount);
    }

    fn refund(&self, to: &Address, amount: i128) {
        self.client()
            .transfer(&self.env.current_contract_address(), to, &amount);
    }
}
