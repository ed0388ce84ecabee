mod types;

pub use self::types::*;

use binrw::{BinRead, BinResult, BinWrite};

/// Reads `const_pool_size - 1` pool slots, filling the slot after every
/// Long/Double with [`ConstantInfo::Unusable`] so that entry `i` lives at
/// `const_pool[i - 1]`.
#[binrw::parser(reader, endian)]
pub fn pool_parser(const_pool_size: u16) -> BinResult<Vec<ConstantInfo>> {
    let slots = const_pool_size.saturating_sub(1) as usize;
    let mut pool = Vec::with_capacity(slots);
    while pool.len() < slots {
        let entry = ConstantInfo::read_options(reader, endian, ())?;
        let wide = entry.is_wide();
        pool.push(entry);
        if wide {
            pool.push(ConstantInfo::Unusable);
        }
    }
    Ok(pool)
}

#[binrw::writer(writer, endian)]
pub fn pool_writer(pool: &Vec<ConstantInfo>) -> BinResult<()> {
    for entry in pool {
        if !matches!(entry, ConstantInfo::Unusable) {
            entry.write_options(writer, endian, ())?;
        }
    }
    Ok(())
}
