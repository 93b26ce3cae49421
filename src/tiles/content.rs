//! Tile content envelope parsing
//!
//! Tile content arrives wrapped in a container format. Only mesh-bearing
//! containers are understood here:
//! - `b3dm` (batched 3D model): header, feature/batch tables, embedded glb
//! - `glTF` binary (glb) served directly
//!
//! Instanced models, point clouds and composites are not supported and
//! yield no payload.

use bytemuck::{Pod, Zeroable};
use serde::Deserialize;

use crate::core::types::DVec3;

const B3DM_MAGIC: &[u8; 4] = b"b3dm";
const GLB_MAGIC: &[u8; 4] = b"glTF";

/// Fixed 28-byte b3dm header, little-endian
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct B3dmHeader {
    magic: [u8; 4],
    version: u32,
    byte_length: u32,
    feature_table_json_length: u32,
    feature_table_binary_length: u32,
    batch_table_json_length: u32,
    batch_table_binary_length: u32,
}

const B3DM_HEADER_LEN: usize = std::mem::size_of::<B3dmHeader>();

#[derive(Debug, Default, Deserialize)]
struct FeatureTable {
    #[serde(rename = "RTC_CENTER")]
    rtc_center: Option<[f64; 3]>,
}

/// Mesh payload extracted from a content envelope
#[derive(Clone, Debug, PartialEq)]
pub struct TileContents {
    /// Binary glTF bytes
    pub gltf: Vec<u8>,
    /// Offset the payload's vertices are relative to
    pub rtc_center: DVec3,
}

/// Extract the mesh payload from raw tile content.
///
/// Returns `None` for unsupported or malformed envelopes.
pub fn extract_mesh_payload(content: &[u8]) -> Option<TileContents> {
    let magic = content.get(..4)?;
    if magic == GLB_MAGIC {
        return Some(TileContents {
            gltf: content.to_vec(),
            rtc_center: DVec3::ZERO,
        });
    }
    if magic == B3DM_MAGIC {
        return extract_b3dm(content);
    }

    log::debug!("Unsupported tile content: {:?}", String::from_utf8_lossy(magic));
    None
}

fn extract_b3dm(content: &[u8]) -> Option<TileContents> {
    let header: B3dmHeader = bytemuck::pod_read_unaligned(content.get(..B3DM_HEADER_LEN)?);
    let version = u32::from_le(header.version);
    if version != 1 {
        log::debug!("Unsupported b3dm version {}", version);
        return None;
    }

    let ft_json_len = u32::from_le(header.feature_table_json_length) as usize;
    let ft_binary_len = u32::from_le(header.feature_table_binary_length) as usize;
    let bt_json_len = u32::from_le(header.batch_table_json_length) as usize;
    let bt_binary_len = u32::from_le(header.batch_table_binary_length) as usize;

    let ft_json_start = B3DM_HEADER_LEN;
    let ft_json = content.get(ft_json_start..ft_json_start + ft_json_len)?;
    let gltf_start = ft_json_start + ft_json_len + ft_binary_len + bt_json_len + bt_binary_len;
    let gltf = content.get(gltf_start..)?;
    if gltf.is_empty() {
        return None;
    }

    let rtc_center = parse_feature_table(ft_json)
        .rtc_center
        .map(DVec3::from_array)
        .unwrap_or(DVec3::ZERO);

    Some(TileContents {
        gltf: gltf.to_vec(),
        rtc_center,
    })
}

fn parse_feature_table(json: &[u8]) -> FeatureTable {
    // Feature table JSON is padded with trailing spaces
    let trimmed = json.trim_ascii_end();
    if trimmed.is_empty() {
        return FeatureTable::default();
    }
    serde_json::from_slice(trimmed).unwrap_or_else(|e| {
        log::warn!("Ignoring malformed b3dm feature table: {}", e);
        FeatureTable::default()
    })
}

/// Wrap a glb payload in a b3dm envelope
pub fn build_b3dm(gltf: &[u8], rtc_center: Option<DVec3>) -> Vec<u8> {
    let mut ft_json = match rtc_center {
        Some(c) => serde_json::json!({ "BATCH_LENGTH": 0, "RTC_CENTER": [c.x, c.y, c.z] }),
        None => serde_json::json!({ "BATCH_LENGTH": 0 }),
    }
    .to_string()
    .into_bytes();
    while (B3DM_HEADER_LEN + ft_json.len()) % 8 != 0 {
        ft_json.push(b' ');
    }

    let header = B3dmHeader {
        magic: *B3DM_MAGIC,
        version: 1u32.to_le(),
        byte_length: ((B3DM_HEADER_LEN + ft_json.len() + gltf.len()) as u32).to_le(),
        feature_table_json_length: (ft_json.len() as u32).to_le(),
        feature_table_binary_length: 0,
        batch_table_json_length: 0,
        batch_table_binary_length: 0,
    };

    let mut out = Vec::with_capacity(B3DM_HEADER_LEN + ft_json.len() + gltf.len());
    out.extend_from_slice(bytemuck::bytes_of(&header));
    out.extend_from_slice(&ft_json);
    out.extend_from_slice(gltf);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_glb() -> Vec<u8> {
        let mut glb = GLB_MAGIC.to_vec();
        glb.extend_from_slice(&[2, 0, 0, 0, 12, 0, 0, 0]);
        glb
    }

    #[test]
    fn test_header_size() {
        assert_eq!(B3DM_HEADER_LEN, 28);
    }

    #[test]
    fn test_plain_glb() {
        let glb = fake_glb();
        let contents = extract_mesh_payload(&glb).unwrap();
        assert_eq!(contents.gltf, glb);
        assert_eq!(contents.rtc_center, DVec3::ZERO);
    }

    #[test]
    fn test_b3dm_with_rtc_center() {
        let glb = fake_glb();
        let b3dm = build_b3dm(&glb, Some(DVec3::new(1.0, 2.0, 3.0)));
        let contents = extract_mesh_payload(&b3dm).unwrap();
        assert_eq!(contents.gltf, glb);
        assert_eq!(contents.rtc_center, DVec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_b3dm_without_rtc_center() {
        let glb = fake_glb();
        let contents = extract_mesh_payload(&build_b3dm(&glb, None)).unwrap();
        assert_eq!(contents.gltf, glb);
        assert_eq!(contents.rtc_center, DVec3::ZERO);
    }

    #[test]
    fn test_unsupported_kinds() {
        assert!(extract_mesh_payload(b"pnts0000000000000000000000000000").is_none());
        assert!(extract_mesh_payload(b"i3dm").is_none());
        assert!(extract_mesh_payload(b"").is_none());
        assert!(extract_mesh_payload(b"b3").is_none());
    }

    #[test]
    fn test_truncated_b3dm() {
        let b3dm = build_b3dm(&fake_glb(), Some(DVec3::ONE));
        assert!(extract_mesh_payload(&b3dm[..30]).is_none());
    }
}
