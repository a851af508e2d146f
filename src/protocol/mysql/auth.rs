//! MySQL `mysql_native_password` scrambling
//!
//! Reference: <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase_authentication_methods_native_password_authentication.html>

use sha1::{Digest as Sha1Digest, Sha1};
use zeroize::Zeroize;

/// Compute the auth response for mysql_native_password
///
/// Algorithm:
/// ```text
/// SHA1( password ) XOR SHA1( challenge + SHA1( SHA1( password ) ) )
/// ```
///
/// # Arguments
/// * `challenge` - The challenge from the server greeting (normally 20 bytes)
/// * `password` - The plaintext password
///
/// # Returns
/// The 20-byte authentication response, or an empty response for an empty password
pub fn scramble_password(challenge: &[u8], password: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    // SHA1(password)
    let mut stage1 = [0u8; 20];
    let mut hasher = Sha1::new();
    Sha1Digest::update(&mut hasher, password);
    stage1.copy_from_slice(&hasher.finalize());

    // SHA1(SHA1(password))
    let mut stage2 = [0u8; 20];
    let mut hasher = Sha1::new();
    Sha1Digest::update(&mut hasher, stage1);
    stage2.copy_from_slice(&hasher.finalize());

    // SHA1(challenge + SHA1(SHA1(password)))
    let mut hasher = Sha1::new();
    Sha1Digest::update(&mut hasher, challenge);
    Sha1Digest::update(&mut hasher, stage2);
    let stage3 = hasher.finalize();

    let response = stage1
        .iter()
        .zip(stage3.iter())
        .map(|(a, b)| a ^ b)
        .collect();

    stage1.zeroize();
    stage2.zeroize();
    response
}
