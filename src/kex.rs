//! Static key exchange allow-lists.
//!
//! An algorithm is post-quantum when its identifier is on one of the lists
//! below; everything else is classical. The probes never mix the two classes
//! in one handshake, so each list is offered on its own.
use std::fmt;

use rustls::crypto::SupportedKxGroup;
use rustls::NamedGroup;

/// Which class of key exchange a probe is allowed to offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KexClass {
    Classical,
    PostQuantum,
}

impl fmt::Display for KexClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KexClass::Classical => f.write_str("classical"),
            KexClass::PostQuantum => f.write_str("post-quantum"),
        }
    }
}

/// Code points of the Kyber draft hybrids, still deployed by some servers.
const X25519_KYBER768_DRAFT00: u16 = 0x6399;
const SECP256R1_KYBER768_DRAFT00: u16 = 0x639a;

/// TLS named groups counted as post-quantum (pure ML-KEM and EC+ML-KEM hybrids).
pub fn is_post_quantum_tls_group(group: NamedGroup) -> bool {
    match group {
        NamedGroup::X25519MLKEM768
        | NamedGroup::secp256r1MLKEM768
        | NamedGroup::MLKEM512
        | NamedGroup::MLKEM768
        | NamedGroup::MLKEM1024 => true,
        other => matches!(
            u16::from(other),
            X25519_KYBER768_DRAFT00 | SECP256R1_KYBER768_DRAFT00
        ),
    }
}

/// Display name for a TLS group, including the draft code points rustls does not name.
pub fn tls_group_name(group: NamedGroup) -> String {
    match u16::from(group) {
        X25519_KYBER768_DRAFT00 => "X25519Kyber768Draft00".to_string(),
        SECP256R1_KYBER768_DRAFT00 => "SecP256r1Kyber768Draft00".to_string(),
        _ => match group {
            NamedGroup::secp256r1 => "P-256".to_string(),
            NamedGroup::secp384r1 => "P-384".to_string(),
            NamedGroup::secp521r1 => "P-521".to_string(),
            NamedGroup::secp256r1MLKEM768 => "SecP256r1MLKEM768".to_string(),
            other => format!("{other:?}"),
        },
    }
}

/// Groups the TLS probe may offer for `class`, taken from every group the
/// crypto provider implements.
pub fn tls_groups(class: KexClass) -> Vec<&'static dyn SupportedKxGroup> {
    rustls::crypto::aws_lc_rs::ALL_KX_GROUPS
        .iter()
        .copied()
        .filter(|g| is_post_quantum_tls_group(g.name()) == (class == KexClass::PostQuantum))
        .collect()
}

/// SSH key exchange method names counted as post-quantum.
pub const PQ_SSH_KEX: &[&str] = &[
    "mlkem768x25519-sha256",
    "sntrup761x25519-sha512",
    "sntrup761x25519-sha512@openssh.com",
];

pub fn is_post_quantum_ssh_kex(name: &str) -> bool {
    PQ_SSH_KEX.contains(&name)
}

/// Key exchange methods the SSH client implementation can run.
const SSH_KEX_CANDIDATES: &[russh::kex::Name] = &[
    russh::kex::MLKEM768X25519_SHA256,
    russh::kex::CURVE25519,
    russh::kex::CURVE25519_PRE_RFC_8731,
    russh::kex::ECDH_SHA2_NISTP256,
    russh::kex::DH_G16_SHA512,
    russh::kex::DH_G14_SHA256,
];

/// SSH methods the probe may offer for `class`.
pub fn ssh_kex(class: KexClass) -> Vec<russh::kex::Name> {
    SSH_KEX_CANDIDATES
        .iter()
        .copied()
        .filter(|n| is_post_quantum_ssh_kex(n.as_ref()) == (class == KexClass::PostQuantum))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hybrid_and_pure_mlkem_groups_are_pq() {
        assert!(is_post_quantum_tls_group(NamedGroup::X25519MLKEM768));
        assert!(is_post_quantum_tls_group(NamedGroup::secp256r1MLKEM768));
        assert!(is_post_quantum_tls_group(NamedGroup::MLKEM768));
        assert!(is_post_quantum_tls_group(NamedGroup::from(0x6399)));
        assert!(!is_post_quantum_tls_group(NamedGroup::X25519));
        assert!(!is_post_quantum_tls_group(NamedGroup::secp384r1));
    }

    #[test]
    fn tls_group_lists_are_disjoint_and_non_empty() {
        let pq = tls_groups(KexClass::PostQuantum);
        let classical = tls_groups(KexClass::Classical);
        assert!(!pq.is_empty() && !classical.is_empty());
        assert!(pq.iter().all(|g| is_post_quantum_tls_group(g.name())));
        assert!(classical.iter().all(|g| !is_post_quantum_tls_group(g.name())));
        assert!(pq.iter().any(|g| g.name() == NamedGroup::X25519MLKEM768));
        assert!(classical.iter().any(|g| g.name() == NamedGroup::X25519));
    }

    #[test]
    fn ssh_lists_split_on_allow_list() {
        let pq = ssh_kex(KexClass::PostQuantum);
        let classical = ssh_kex(KexClass::Classical);
        assert_eq!(pq, vec![russh::kex::MLKEM768X25519_SHA256]);
        assert!(classical.contains(&russh::kex::CURVE25519));
        assert!(!classical.contains(&russh::kex::MLKEM768X25519_SHA256));
        assert!(is_post_quantum_ssh_kex("sntrup761x25519-sha512@openssh.com"));
        assert!(!is_post_quantum_ssh_kex("curve25519-sha256"));
    }

    #[test]
    fn group_names() {
        assert_eq!(tls_group_name(NamedGroup::X25519MLKEM768), "X25519MLKEM768");
        assert_eq!(tls_group_name(NamedGroup::secp256r1), "P-256");
        assert_eq!(tls_group_name(NamedGroup::from(0x6399)), "X25519Kyber768Draft00");
    }
}
