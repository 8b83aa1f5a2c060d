//! Credential material handed to a transport

use std::fmt;

/// Secret used to authenticate against a target host
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// OpenSSH private key material
    PrivateKey(String),
    /// Password typed by the operator
    Password(String),
}

impl Credential {
    /// Short label for logs; never includes the secret
    pub fn method(&self) -> &'static str {
        match self {
            Credential::PrivateKey(_) => "publickey",
            Credential::Password(_) => "password",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential::{}(<redacted>)", self.method())
    }
}
