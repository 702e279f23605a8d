//! CIDv1 computation and validation.

use cid::Cid;
use cid::multibase::{self, Base};
use lens_types::{CidBase, CidConfig, Codec, ElementId, HashAlgorithm};
use multihash_codetable::{Code, MultihashDigest};
use serde::Serialize;
use serde_json::Value;

use crate::canonical::canonical_bytes;
use crate::error::CidError;

/// Compute the content id of `value` under `config`.
pub fn compute_id(value: &Value, config: &CidConfig) -> Result<ElementId, CidError> {
    if config.version != 1 {
        return Err(CidError::UnsupportedConfig(format!(
            "cid version {} (only version 1 is supported)",
            config.version
        )));
    }

    let bytes = canonical_bytes(value)?;
    let digest = hash_code(config.hash).digest(&bytes);
    let cid = Cid::new_v1(config.codec.code(), digest);
    let text = cid
        .to_string_of_base(multibase_of(config.base))
        .map_err(|e| CidError::Encoding(e.to_string()))?;
    Ok(ElementId::new(text))
}

/// Compute the content id of any serializable value via its JSON form.
pub fn compute_id_of<T: Serialize>(value: &T, config: &CidConfig) -> Result<ElementId, CidError> {
    let value = serde_json::to_value(value).map_err(|e| CidError::Encoding(e.to_string()))?;
    compute_id(&value, config)
}

/// Decode the configuration an existing id was computed with.
pub fn config_of(id: &str) -> Result<CidConfig, CidError> {
    let cid = Cid::try_from(id).map_err(|e| CidError::Decode(e.to_string()))?;
    if cid.version() != cid::Version::V1 {
        return Err(CidError::UnsupportedConfig(format!("{id} is not a version 1 cid")));
    }

    let (base, _) = multibase::decode(id).map_err(|e| CidError::Decode(e.to_string()))?;
    let base = match base {
        Base::Base58Btc => CidBase::Base58btc,
        Base::Base32Lower => CidBase::Base32,
        other => {
            return Err(CidError::UnsupportedConfig(format!("multibase {other:?}")));
        }
    };
    let codec = Codec::from_code(cid.codec())
        .ok_or_else(|| CidError::UnsupportedConfig(format!("codec {:#x}", cid.codec())))?;
    let hash = HashAlgorithm::from_code(cid.hash().code())
        .ok_or_else(|| CidError::UnsupportedConfig(format!("hash {:#x}", cid.hash().code())))?;

    Ok(CidConfig {
        version: 1,
        codec,
        hash,
        base,
    })
}

/// Whether `id` is the content id of `value`, under the configuration the id
/// itself encodes. Any decoding failure yields `false`.
pub fn validate(id: &str, value: &Value) -> bool {
    let Ok(config) = config_of(id) else {
        return false;
    };
    compute_id(value, &config).is_ok_and(|computed| computed.as_str() == id)
}

/// [`validate`] for any serializable value.
pub fn validate_of<T: Serialize>(id: &str, value: &T) -> bool {
    serde_json::to_value(value).is_ok_and(|value| validate(id, &value))
}

fn hash_code(hash: HashAlgorithm) -> Code {
    match hash {
        HashAlgorithm::Sha2_256 => Code::Sha2_256,
        HashAlgorithm::Sha2_512 => Code::Sha2_512,
        HashAlgorithm::Blake3 => Code::Blake3_256,
    }
}

fn multibase_of(base: CidBase) -> Base {
    match base {
        CidBase::Base58btc => Base::Base58Btc,
        CidBase::Base32 => Base::Base32Lower,
    }
}
