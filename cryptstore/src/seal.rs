//! Leaf encryption and MAC computation.
//!
//! Every leaf is encrypted under the data key with its location and type
//! tag as associated data and stored as
//! `ENC[chacha20_poly1305,data:<b64>,iv:<b64>,type:<tag>]`. The MAC is a
//! SHA-512 digest over all plaintext leaves (location, type, value), sorted
//! by location, and is itself encrypted with the RFC 3339 modification
//! time as associated data.

use crate::error::{ProxyError, ProxyResult};
use crate::tree::{Branch, Document, Leaf, Node, child_location};
use chrono::{DateTime, Utc};
use cryptstore_crypto::{DataKey, EncryptedData, decrypt, encrypt, serde_b64};
use serde_json::{Map, Value};
use sha2::{Digest, Sha512};

const ENC_OPEN: &str = "ENC[chacha20_poly1305,";
const MAC_TYPE: &str = "mac";

/// Encrypts every leaf of `document`, returning the sealed branches and the
/// encrypted MAC.
pub fn seal(
    document: &Document,
    key: &DataKey,
    last_modified: &DateTime<Utc>,
) -> ProxyResult<(Vec<Map<String, Value>>, String)> {
    let mut branches = Vec::with_capacity(document.branches.len());
    for (index, branch) in document.branches.iter().enumerate() {
        let root = index.to_string();
        let mut sealed = Map::new();
        for (name, node) in branch {
            sealed.insert(name.clone(), seal_node(node, &child_location(&root, name), key)?);
        }
        branches.push(sealed);
    }

    let digest = digest(document);
    let mac = encrypt(key, &digest, last_modified.to_rfc3339().as_bytes())?;
    Ok((branches, encode_enc(&mac, MAC_TYPE)))
}

/// Decrypts sealed branches and verifies the MAC before returning them.
pub fn unseal(
    branches: &[Map<String, Value>],
    key: &DataKey,
    mac: &str,
    last_modified: &DateTime<Utc>,
) -> ProxyResult<Document> {
    let mut document = Document::default();
    for (index, sealed) in branches.iter().enumerate() {
        let root = index.to_string();
        let mut branch = Branch::with_capacity(sealed.len());
        for (name, value) in sealed {
            branch.push((name.clone(), unseal_value(value, &child_location(&root, name), key)?));
        }
        document.branches.push(branch);
    }

    let (mac, tag) = decode_enc(mac)?;
    if tag != MAC_TYPE {
        return Err(ProxyError::Decode(format!("mac has type {tag:?}")));
    }
    let expected = decrypt(key, &mac, last_modified.to_rfc3339().as_bytes())
        .map_err(|_| ProxyError::Integrity("MAC cannot be authenticated".to_string()))?;
    if expected != digest(&document) {
        return Err(ProxyError::Integrity("MAC mismatch".to_string()));
    }
    Ok(document)
}

fn seal_node(node: &Node, location: &str, key: &DataKey) -> ProxyResult<Value> {
    match node {
        Node::Leaf(leaf) => {
            let data = encrypt(key, &leaf.to_bytes(), &leaf_aad(location, leaf.type_tag()))?;
            Ok(Value::String(encode_enc(&data, leaf.type_tag())))
        }
        Node::Map(entries) => {
            let mut map = Map::new();
            for (name, child) in entries {
                map.insert(name.clone(), seal_node(child, &child_location(location, name), key)?);
            }
            Ok(Value::Object(map))
        }
        Node::List(items) => items
            .iter()
            .enumerate()
            .map(|(i, child)| seal_node(child, &child_location(location, &i.to_string()), key))
            .collect::<ProxyResult<Vec<_>>>()
            .map(Value::Array),
    }
}

fn unseal_value(value: &Value, location: &str, key: &DataKey) -> ProxyResult<Node> {
    match value {
        Value::String(text) => {
            let (data, tag) = decode_enc(text)?;
            let plaintext = decrypt(key, &data, &leaf_aad(location, &tag)).map_err(|_| {
                ProxyError::Integrity(format!("value at {location} cannot be authenticated"))
            })?;
            Leaf::from_parts(&tag, plaintext)
                .map(Node::Leaf)
                .map_err(|e| ProxyError::Decode(format!("{location}: {e}")))
        }
        Value::Object(map) => map
            .iter()
            .map(|(name, child)| {
                unseal_value(child, &child_location(location, name), key)
                    .map(|node| (name.clone(), node))
            })
            .collect::<ProxyResult<Branch>>()
            .map(Node::Map),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, child)| unseal_value(child, &child_location(location, &i.to_string()), key))
            .collect::<ProxyResult<Vec<_>>>()
            .map(Node::List),
        _ => Err(ProxyError::Decode(format!("unencrypted value at {location}"))),
    }
}

/// Leaf ciphertexts authenticate both where they sit and how they decode.
fn leaf_aad(location: &str, tag: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(location.len() + tag.len() + 1);
    aad.extend_from_slice(location.as_bytes());
    aad.push(0);
    aad.extend_from_slice(tag.as_bytes());
    aad
}

fn digest(document: &Document) -> Vec<u8> {
    let mut leaves = document.leaves();
    leaves.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha512::new();
    for (location, leaf) in leaves {
        let value = leaf.to_bytes();
        for field in [location.as_bytes(), leaf.type_tag().as_bytes(), value.as_slice()] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field);
        }
    }
    hasher.finalize().to_vec()
}

fn encode_enc(data: &EncryptedData, tag: &str) -> String {
    format!(
        "{ENC_OPEN}data:{},iv:{},type:{tag}]",
        serde_b64::encode(&data.ciphertext),
        serde_b64::encode(&data.nonce)
    )
}

fn decode_enc(text: &str) -> ProxyResult<(EncryptedData, String)> {
    let malformed = || ProxyError::Decode(format!("malformed encrypted value {text:?}"));
    let inner = text
        .strip_prefix(ENC_OPEN)
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(malformed)?;

    let mut data = None;
    let mut iv = None;
    let mut tag = None;
    for part in inner.split(',') {
        let (name, value) = part.split_once(':').ok_or_else(malformed)?;
        match name {
            "data" => data = Some(serde_b64::decode(value).map_err(|_| malformed())?),
            "iv" => iv = Some(serde_b64::decode(value).map_err(|_| malformed())?),
            "type" => tag = Some(value.to_string()),
            _ => return Err(malformed()),
        }
    }
    match (data, iv, tag) {
        (Some(ciphertext), Some(nonce), Some(tag)) => Ok((EncryptedData::new(nonce, ciphertext), tag)),
        _ => Err(malformed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PayloadFormat;

    fn sample() -> Document {
        PayloadFormat::Json
            .parse(br#"{"a":{"b":[1,"two",true,null]},"c":"secret"}"#)
            .unwrap()
    }

    #[test]
    fn seal_then_unseal_restores_document() {
        let key = DataKey::generate();
        let now = Utc::now();
        let (branches, mac) = seal(&sample(), &key, &now).unwrap();
        assert_eq!(unseal(&branches, &key, &mac, &now).unwrap(), sample());
    }

    #[test]
    fn sealed_values_hide_plaintext() {
        let key = DataKey::generate();
        let (branches, _) = seal(&sample(), &key, &Utc::now()).unwrap();
        let text = serde_json::to_string(&branches).unwrap();
        assert!(!text.contains("secret"));
        assert!(!text.contains("two"));
    }

    #[test]
    fn swapped_ciphertexts_fail_authentication() {
        let key = DataKey::generate();
        let now = Utc::now();
        let doc = PayloadFormat::Json.parse(br#"{"x":"1","y":"2"}"#).unwrap();
        let (mut branches, mac) = seal(&doc, &key, &now).unwrap();
        let x = branches[0]["x"].clone();
        let y = branches[0]["y"].clone();
        branches[0].insert("x".into(), y);
        branches[0].insert("y".into(), x);
        assert!(matches!(
            unseal(&branches, &key, &mac, &now),
            Err(ProxyError::Integrity(_))
        ));
    }

    #[test]
    fn retagged_leaf_fails_authentication() {
        let key = DataKey::generate();
        let now = Utc::now();
        let doc = PayloadFormat::Json.parse(br#"{"s":"true"}"#).unwrap();
        let (mut branches, mac) = seal(&doc, &key, &now).unwrap();
        let retagged = branches[0]["s"].as_str().unwrap().replace("type:str", "type:bool");
        branches[0].insert("s".into(), Value::String(retagged));
        assert!(matches!(
            unseal(&branches, &key, &mac, &now),
            Err(ProxyError::Integrity(_))
        ));
    }

    #[test]
    fn changed_timestamp_fails_mac() {
        let key = DataKey::generate();
        let now = Utc::now();
        let (branches, mac) = seal(&sample(), &key, &now).unwrap();
        let later = now + chrono::Duration::seconds(1);
        assert!(matches!(
            unseal(&branches, &key, &mac, &later),
            Err(ProxyError::Integrity(_))
        ));
    }

    #[test]
    fn dropped_leaf_fails_mac() {
        let key = DataKey::generate();
        let now = Utc::now();
        let (mut branches, mac) = seal(&sample(), &key, &now).unwrap();
        branches[0].remove("c");
        assert!(matches!(
            unseal(&branches, &key, &mac, &now),
            Err(ProxyError::Integrity(_))
        ));
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let now = Utc::now();
        let (branches, mac) = seal(&sample(), &DataKey::generate(), &now).unwrap();
        assert!(matches!(
            unseal(&branches, &DataKey::generate(), &mac, &now),
            Err(ProxyError::Integrity(_))
        ));
    }

    #[test]
    fn plaintext_values_are_rejected() {
        let mut branch = Map::new();
        branch.insert("n".into(), Value::from(5));
        assert!(matches!(
            unseal(&[branch], &DataKey::generate(), "", &Utc::now()),
            Err(ProxyError::Decode(_))
        ));
    }

    #[test]
    fn enc_strings_round_trip() {
        let data = EncryptedData::new(vec![1; 12], vec![2; 20]);
        let (back, tag) = decode_enc(&encode_enc(&data, "str")).unwrap();
        assert_eq!(back, data);
        assert_eq!(tag, "str");
        assert!(decode_enc("ENC[aes256_gcm,data:AA==]").is_err());
    }
}
