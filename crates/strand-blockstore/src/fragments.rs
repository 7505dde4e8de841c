//! Bulk fragment retrieval
//!
//! Fragments are fetched concurrently but always handed back in request order.

use bytes::Bytes;
use cid::Cid;
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::block::FragmentWithHash;
use crate::cid_utils::ContentHashExt;
use crate::{BlockStoreError, ContentAddressedStorage, Result};

/// Number of fragment downloads kept in flight
pub const DOWNLOAD_CONCURRENCY: usize = 16;

/// Progress callback, invoked with the plaintext-equivalent bytes of each fragment
pub type Progress = dyn Fn(u64) + Send + Sync;

/// Progress callback that discards updates
pub fn ignore_progress(_bytes: u64) {}

/// Scale a stored size back to the plaintext size it represents
pub(crate) fn scaled_size(stored: usize, space_factor: f64) -> u64 {
    if space_factor > 0.0 {
        (stored as f64 / space_factor) as u64
    } else {
        stored as u64
    }
}

/// Download fragments one block at a time through `store.get_raw`
pub async fn download_fragments<S>(
    store: &S,
    hashes: &[Cid],
    monitor: &Progress,
    space_factor: f64,
) -> Result<Vec<FragmentWithHash>>
where
    S: ContentAddressedStorage + ?Sized,
{
    stream::iter(hashes.iter().copied())
        .map(|hash| async move {
            let fragment = match FragmentWithHash::from_identity(hash) {
                Some(inline) => inline,
                None => {
                    let data: Bytes = store
                        .get_raw(&hash)
                        .await?
                        .ok_or(BlockStoreError::NotFound(hash))?;
                    FragmentWithHash::new(hash, data)
                }
            };
            monitor(scaled_size(fragment.size(), space_factor));
            Ok::<_, BlockStoreError>(fragment)
        })
        .buffered(DOWNLOAD_CONCURRENCY)
        .try_collect()
        .await
}

/// Put bulk results back into request order
///
/// `retrieved` pairs each downloaded fragment with its position in `hashes`.
/// Positions left empty must hold identity hashes, which are filled inline.
pub fn reassemble(
    hashes: &[Cid],
    retrieved: Vec<(usize, FragmentWithHash)>,
) -> Result<Vec<FragmentWithHash>> {
    let mut slots: Vec<Option<FragmentWithHash>> = hashes.iter().map(|_| None).collect();
    for (index, fragment) in retrieved {
        let slot = slots.get_mut(index).ok_or_else(|| {
            BlockStoreError::IndexAlignmentFault(format!(
                "result index {index} outside {} requested hashes",
                hashes.len()
            ))
        })?;
        if fragment.hash != hashes[index] {
            return Err(BlockStoreError::IndexAlignmentFault(format!(
                "position {index} expected {} but got {}",
                hashes[index], fragment.hash
            )));
        }
        *slot = Some(fragment);
    }

    slots
        .into_iter()
        .zip(hashes)
        .map(|(slot, hash)| match slot {
            Some(fragment) => Ok(fragment),
            None if hash.is_identity() => FragmentWithHash::from_identity(*hash).ok_or_else(|| {
                BlockStoreError::IndexAlignmentFault(format!("{hash} is not an identity hash"))
            }),
            None => Err(BlockStoreError::IndexAlignmentFault(format!(
                "hash should be identity: {hash}"
            ))),
        })
        .collect()
}
