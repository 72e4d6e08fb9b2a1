//! Password and SASL responses.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::protocol::codec::MessageBuilder;

type HmacSha256 = Hmac<Sha256>;

/// GS2 header: no channel binding.
const GS2_HEADER: &str = "n,,";

/// Write a PasswordMessage (cleartext or MD5 hashed password).
pub fn write_password(buf: &mut Vec<u8>, password: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PASSWORD);
    msg.write_cstr(password);
    msg.finish();
}

/// `"md5" + md5(md5(password + user) + salt)` in lowercase hex.
pub fn md5_password(user: &str, password: &str, salt: &[u8; 4]) -> String {
    use md5::Md5;

    let inner = Md5::new()
        .chain_update(password.as_bytes())
        .chain_update(user.as_bytes())
        .finalize();
    let outer = Md5::new()
        .chain_update(format!("{:x}", inner).as_bytes())
        .chain_update(salt)
        .finalize();
    format!("md5{:x}", outer)
}

/// Write a SASLInitialResponse message.
pub fn write_sasl_initial_response(buf: &mut Vec<u8>, mechanism: &str, initial_response: &[u8]) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PASSWORD);
    msg.write_cstr(mechanism);
    msg.write_i32(initial_response.len() as i32);
    msg.write_bytes(initial_response);
    msg.finish();
}

/// Write a SASLResponse message.
pub fn write_sasl_response(buf: &mut Vec<u8>, response: &[u8]) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PASSWORD);
    msg.write_bytes(response);
    msg.finish();
}

fn hmac(key: &[u8], data: &[u8]) -> Result<[u8; 32]> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::Connection(format!("SCRAM: HMAC key rejected: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// Client side of SCRAM-SHA-256 without channel binding.
pub struct ScramClient {
    nonce: String,
    password: String,
    /// Set once the server-first-message is processed: (salted password, auth message)
    proof_state: Option<([u8; 32], String)>,
}

impl ScramClient {
    pub fn new(password: &str) -> Self {
        use rand::Rng;

        let mut nonce_bytes = [0u8; 24];
        rand::rng().fill(&mut nonce_bytes);
        Self {
            nonce: BASE64.encode(nonce_bytes),
            password: password.to_string(),
            proof_state: None,
        }
    }

    /// The server takes the user from the startup packet, so `n=` stays empty.
    fn client_first_bare(&self) -> String {
        format!("n=,r={}", self.nonce)
    }

    pub fn client_first_message(&self) -> String {
        format!("{}{}", GS2_HEADER, self.client_first_bare())
    }

    /// Consume `r=<nonce>,s=<salt>,i=<iterations>` and produce the client-final-message.
    pub fn process_server_first(&mut self, server_first: &str) -> Result<String> {
        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for attr in server_first.split(',') {
            match attr.split_once('=') {
                Some(("r", v)) => nonce = Some(v),
                Some(("s", v)) => salt = Some(v),
                Some(("i", v)) => iterations = v.parse::<u32>().ok(),
                _ => {}
            }
        }
        let missing = |what: &str| Error::Connection(format!("SCRAM: server-first-message lacks {}", what));
        let nonce = nonce.ok_or_else(|| missing("nonce"))?;
        let salt = salt.ok_or_else(|| missing("salt"))?;
        let iterations = iterations.ok_or_else(|| missing("iteration count"))?;

        if !nonce.starts_with(&self.nonce) {
            return Err(Error::Connection(
                "SCRAM: server nonce does not extend the client nonce".into(),
            ));
        }
        let salt = BASE64
            .decode(salt)
            .map_err(|e| Error::Connection(format!("SCRAM: invalid salt: {}", e)))?;

        let mut salted = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(self.password.as_bytes(), &salt, iterations, &mut salted);

        let client_key = hmac(&salted, b"Client Key")?;
        let stored_key = Sha256::digest(client_key);

        let without_proof = format!("c={},r={}", BASE64.encode(GS2_HEADER), nonce);
        let auth_message = format!("{},{},{}", self.client_first_bare(), server_first, without_proof);
        let signature = hmac(&stored_key, auth_message.as_bytes())?;

        let proof: Vec<u8> = client_key
            .iter()
            .zip(signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();

        self.proof_state = Some((salted, auth_message));
        Ok(format!("{},p={}", without_proof, BASE64.encode(proof)))
    }

    /// Check `v=<server signature>` from SASLFinal.
    pub fn verify_server_final(&self, server_final: &str) -> Result<()> {
        let (salted, auth_message) = self
            .proof_state
            .as_ref()
            .ok_or_else(|| Error::Connection("SCRAM: final message before server-first".into()))?;
        let received = server_final
            .strip_prefix("v=")
            .ok_or_else(|| Error::Connection(format!("SCRAM: {}", server_final)))?;
        let received = BASE64
            .decode(received)
            .map_err(|e| Error::Connection(format!("SCRAM: invalid server signature: {}", e)))?;

        let server_key = hmac(salted, b"Server Key")?;
        let expected = hmac(&server_key, auth_message.as_bytes())?;
        if received.as_slice() != expected.as_slice() {
            return Err(Error::Connection(
                "SCRAM: server signature verification failed".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_known_vector() {
        // md5(md5("secret" + "alice") + "abcd") computed with PostgreSQL's algorithm
        let hash = md5_password("alice", "secret", b"abcd");
        assert!(hash.starts_with("md5"));
        assert_eq!(hash.len(), 35);
        assert_eq!(hash, md5_password("alice", "secret", b"abcd"));
        assert_ne!(hash, md5_password("alice", "secret", b"abce"));
    }

    #[test]
    fn password_message() {
        let mut buf = Vec::new();
        write_password(&mut buf, "secret");
        assert_eq!(buf[0], b'p');
        assert_eq!(&buf[5..], b"secret\0");
    }

    #[test]
    fn scram_rejects_foreign_nonce() {
        let mut client = ScramClient::new("pw");
        assert!(client.client_first_message().starts_with("n,,n=,r="));
        let err = client
            .process_server_first("r=someone-else,s=c2FsdA==,i=4096")
            .unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn scram_round_trip_signature() {
        let mut client = ScramClient::new("pencil");
        let server_first = format!("r={}srv,s=QSXCR+Q6sek8bf92,i=4096", client.nonce);
        let final_msg = client.process_server_first(&server_first).unwrap();
        assert!(final_msg.starts_with("c=biws,r="));
        assert!(final_msg.contains(",p="));

        let (salted, auth_message) = client.proof_state.clone().unwrap();
        let server_key = hmac(&salted, b"Server Key").unwrap();
        let signature = hmac(&server_key, auth_message.as_bytes()).unwrap();
        client
            .verify_server_final(&format!("v={}", BASE64.encode(signature)))
            .unwrap();
        assert!(client.verify_server_final("v=AAAA").is_err());
    }
}
