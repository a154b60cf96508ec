//! Greedy, order-preserving bin packing of files into size-bounded groups.

use crate::error::PartitionError;
use crate::model::ArchiveFormat;

/// Anything with a byte size that can be packed into an archive.
pub trait Weighted {
    fn weight(&self) -> u64;
}

impl Weighted for u64 {
    fn weight(&self) -> u64 {
        *self
    }
}

/// One planned archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group<T> {
    /// 1-based sequence number within the job.
    pub archive_id: u32,
    pub format: ArchiveFormat,
    pub total_size: u64,
    pub items: Vec<T>,
}

/// Packs `items` in input order. A group is closed as soon as the next item
/// would push it past `max_bytes`; an item larger than `max_bytes` always
/// gets a group of its own.
pub fn partition<T: Weighted>(
    items: Vec<T>,
    max_bytes: u64,
    format: ArchiveFormat,
) -> Result<Vec<Group<T>>, PartitionError> {
    if max_bytes == 0 {
        return Err(PartitionError::InvalidLimit);
    }
    if items.is_empty() {
        return Err(PartitionError::EmptyInput);
    }

    let mut groups: Vec<Group<T>> = Vec::new();
    let mut current: Vec<T> = Vec::new();
    let mut current_size: u64 = 0;

    for item in items {
        let weight = item.weight();
        if !current.is_empty() && current_size.saturating_add(weight) > max_bytes {
            close_group(&mut groups, &mut current, &mut current_size, format);
        }
        current_size = current_size.saturating_add(weight);
        current.push(item);
    }
    close_group(&mut groups, &mut current, &mut current_size, format);

    log::debug!(
        "Partitioned files into {} group(s) of at most {} bytes",
        groups.len(),
        max_bytes
    );

    Ok(groups)
}

fn close_group<T>(
    groups: &mut Vec<Group<T>>,
    current: &mut Vec<T>,
    current_size: &mut u64,
    format: ArchiveFormat,
) {
    if current.is_empty() {
        return;
    }
    groups.push(Group {
        archive_id: groups.len() as u32 + 1,
        format,
        total_size: *current_size,
        items: std::mem::take(current),
    });
    *current_size = 0;
}
