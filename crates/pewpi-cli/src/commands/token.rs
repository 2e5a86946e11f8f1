//! Token command handlers

use anyhow::{anyhow, bail, Context, Result};

use pewpi_core::{NewToken, Store, TokenType};

use crate::output::Output;
use crate::prompt::confirm;

/// Mint a new token
pub fn mint(
    store: &mut Store,
    token_type: TokenType,
    value: Option<f64>,
    user: Option<String>,
    output: &Output,
) -> Result<()> {
    let token = store
        .ledger_mut()
        .create_token(NewToken {
            token_type,
            value,
            user_id: user,
        })
        .context("Failed to mint token")?;

    output.success(&format!("Minted {} token: {}", token.token_type, token.token_id));
    output.print_token(&token);
    Ok(())
}

/// List tokens, optionally for one user
pub fn list(store: &Store, user: Option<String>, output: &Output) -> Result<()> {
    let tokens = match user {
        Some(ref u) => store.ledger().get_by_user_id(u),
        None => store.ledger().get_all(),
    };

    output.print_tokens(&tokens);
    Ok(())
}

/// Show a user's balance (current user by default)
pub fn balance(store: &Store, user: Option<String>, output: &Output) -> Result<()> {
    let user = user.unwrap_or_else(|| store.ledger().current_user_id());
    let balance = store.ledger().get_balance(&user);

    output.print_balance(&user, balance);
    Ok(())
}

/// Mark a token spent
pub fn spend(store: &mut Store, id: String, output: &Output) -> Result<()> {
    let token = store
        .ledger_mut()
        .spend(&id)
        .context("Failed to spend token")?
        .ok_or_else(|| anyhow!("Token not found: {}", id))?;

    output.success(&format!("Spent token: {}", token.token_id));
    output.print_token(&token);
    Ok(())
}

/// Mark a token revoked
pub fn revoke(store: &mut Store, id: String, output: &Output) -> Result<()> {
    let token = store
        .ledger_mut()
        .revoke(&id)
        .context("Failed to revoke token")?
        .ok_or_else(|| anyhow!("Token not found: {}", id))?;

    output.success(&format!("Revoked token: {}", token.token_id));
    output.print_token(&token);
    Ok(())
}

/// Remove every token
pub fn clear(store: &mut Store, yes: bool, output: &Output) -> Result<()> {
    let count = store.ledger().len();

    if !yes {
        if !output.should_prompt() {
            bail!("Refusing to clear the ledger without --yes");
        }
        println!("This removes all {} token(s) from the ledger.", count);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store
        .ledger_mut()
        .clear_all()
        .context("Failed to clear ledger")?;

    output.success(&format!("Cleared {} token(s)", count));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;

    fn quiet() -> Output {
        Output::new(OutputFormat::Quiet)
    }

    #[test]
    fn test_mint_and_balance() {
        let mut store = Store::in_memory();
        store.ledger().set_current_user_id("alice").unwrap();

        mint(&mut store, TokenType::Gold, None, None, &quiet()).unwrap();
        mint(&mut store, TokenType::Bronze, Some(2.0), None, &quiet()).unwrap();
        mint(&mut store, TokenType::Silver, None, Some("bob".into()), &quiet()).unwrap();

        assert_eq!(store.ledger().get_balance("alice"), 12.0);
        assert_eq!(store.ledger().get_balance("bob"), 5.0);
        balance(&store, None, &quiet()).unwrap();
    }

    #[test]
    fn test_spend_unknown_token_fails() {
        let mut store = Store::in_memory();
        let err = spend(&mut store, "token_missing".into(), &quiet()).unwrap_err();
        assert!(err.to_string().contains("Token not found"));
    }

    #[test]
    fn test_spend_twice_fails() {
        let mut store = Store::in_memory();
        mint(&mut store, TokenType::Gold, None, None, &quiet()).unwrap();
        let id = store.ledger().get_all()[0].token_id.clone();

        spend(&mut store, id.clone(), &quiet()).unwrap();
        assert!(revoke(&mut store, id, &quiet()).is_err());
    }

    #[test]
    fn test_clear_requires_yes_when_not_interactive() {
        let mut store = Store::in_memory();
        mint(&mut store, TokenType::Gold, None, None, &quiet()).unwrap();

        assert!(clear(&mut store, false, &quiet()).is_err());
        assert_eq!(store.ledger().len(), 1);

        clear(&mut store, true, &quiet()).unwrap();
        assert!(store.ledger().is_empty());
    }
}
