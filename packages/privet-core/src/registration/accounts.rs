use serde::{Deserialize, Serialize};

/// Index the front-end uses for the signed-in identity
pub const IDENTITY_ACCOUNT_INDEX: i64 = -1;

/// Account a registration confirms on behalf of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountChoice {
    /// The signed-in identity, confirmed with a bearer token
    Identity,
    /// Position in the cookie-session account list
    Cookie(u32),
}

impl AccountChoice {
    /// Map a wire index to a choice; anything below `-1` is invalid
    pub fn from_index(index: i64) -> Option<Self> {
        if index == IDENTITY_ACCOUNT_INDEX {
            Some(AccountChoice::Identity)
        } else {
            u32::try_from(index).ok().map(AccountChoice::Cookie)
        }
    }

    pub fn index(&self) -> i64 {
        match self {
            AccountChoice::Identity => IDENTITY_ACCOUNT_INDEX,
            AccountChoice::Cookie(i) => i64::from(*i),
        }
    }
}

/// One selectable account as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub index: i64,
    pub label: String,
}

/// Annotate the cookie-session accounts for the account picker.
///
/// The signed-in identity, when it is one of the cookie accounts, comes first
/// with the identity index. The remaining accounts keep their list position
/// as index since that is the `user` number the cloud expects.
pub fn annotate_accounts(accounts: &[String], signed_in: Option<&str>) -> Vec<AccountEntry> {
    let signed_in = signed_in.filter(|s| !s.is_empty());
    let mut annotated = Vec::with_capacity(accounts.len());

    if let Some(identity) = signed_in.filter(|s| accounts.iter().any(|a| a == s)) {
        annotated.push(AccountEntry {
            index: IDENTITY_ACCOUNT_INDEX,
            label: identity.to_string(),
        });
    }

    for (position, account) in accounts.iter().enumerate() {
        if Some(account.as_str()) == signed_in {
            continue;
        }
        annotated.push(AccountEntry {
            index: position as i64,
            label: account.clone(),
        });
    }

    annotated
}
