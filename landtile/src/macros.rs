//! Record-materialization macros for the tile codec.

/// Transmutes a run of fixed-size records into a `Vec<T>`.
/// This can't be written as a function because the const generics
/// require explicit types and that context isn't available from function
/// generic params.
#[macro_export]
macro_rules! transmute_records {
    ($type:ty, $data:expr, $offset:expr, $item_count:expr) => {{
        const REC_SIZE: usize = size_of::<$type>();
        (0..$item_count)
            .map(|i| {
                let range = $offset + REC_SIZE * i..$offset + REC_SIZE * (i + 1);
                let slice: [u8; REC_SIZE] = $data[range].try_into()?;
                Ok(transmute!(slice))
            })
            .collect::<Result<_, TileDecodeError>>()
            .map(|res| (res, $offset + REC_SIZE * $item_count))
    }};
}

/// Tries to transmute a run of fixed-size records into a `Vec<T>`.
/// Analogous to [`transmute_records`](crate::transmute_records),
/// but for types implementing [`zerocopy::TryFromBytes`]
/// rather than [`zerocopy::FromBytes`].
#[macro_export]
macro_rules! try_transmute_records {
    ($type:ty, $data:expr, $offset:expr, $item_count:expr) => {{
        const REC_SIZE: usize = size_of::<$type>();
        (0..$item_count)
            .map(|i| {
                let range = $offset + REC_SIZE * i..$offset + REC_SIZE * (i + 1);
                let slice: [u8; REC_SIZE] = $data[range].try_into()?;
                try_transmute!(slice).map_err(|_| TileDecodeError::ValidityError)
            })
            .collect::<Result<_, TileDecodeError>>()
            .map(|res| (res, $offset + REC_SIZE * $item_count))
    }};
}
