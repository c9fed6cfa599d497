use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::accounts::{Account, Role};

#[derive(Error, Debug)]
#[error("Token error: {0}")]
pub struct TokenError(#[from] jsonwebtoken::errors::Error);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Mints and checks HS256 session tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validity: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], validity: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validity,
        }
    }

    pub fn issue(&self, account: &Account) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            user_id: account.id.to_string(),
            email: account.email.clone(),
            role: account.role,
            iat: now.timestamp(),
            exp: (now + self.validity).timestamp(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        Ok(decode::<Claims>(token, &self.decoding, &Validation::default())?.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::NewAccount;

    fn account() -> Account {
        Account::from(NewAccount {
            email: "a@b.com".to_string(),
            name: "A".to_string(),
            phone: String::new(),
            role: Role::Farmer,
            password_hash: String::new(),
            email_verified: true,
        })
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = TokenIssuer::new(b"secret", Duration::days(7));
        let account = account();

        let claims = issuer.verify(&issuer.issue(&account).unwrap()).unwrap();

        assert_eq!(claims.user_id, account.id.to_string());
        assert_eq!(claims.email, "a@b.com");
        assert_eq!(claims.role, Role::Farmer);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_wrong_secret() {
        let token = TokenIssuer::new(b"secret", Duration::days(7))
            .issue(&account())
            .unwrap();

        assert!(TokenIssuer::new(b"other", Duration::days(7)).verify(&token).is_err());
    }

    #[test]
    fn test_expired() {
        let issuer = TokenIssuer::new(b"secret", Duration::hours(-2));
        let token = issuer.issue(&account()).unwrap();

        assert!(issuer.verify(&token).is_err());
        assert!(issuer.verify("not.a.token").is_err());
    }
}
