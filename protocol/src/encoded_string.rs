//! Fixed-width string encoding used by high-frequency API events.
//!
//! A string is packed eight bytes per `u64` chunk, most significant byte
//! first. The first eight chunks live in dedicated message fields
//! (`encoded_name_1` .. `encoded_name_8`), anything longer spills into
//! `encoded_name_additional`. A zero byte terminates the string, so the
//! empty string is an all-zero first chunk.

/// Number of chunks stored in dedicated fields before spilling into the
/// overflow list.
pub const ENCODED_NAME_CHUNKS: usize = 8;

const CHUNK_BYTES: usize = 8;

/// A message carrying an encoded name.
pub trait EncodedName {
    fn encoded_name_chunks(&self) -> [u64; ENCODED_NAME_CHUNKS];

    fn encoded_name_additional(&self) -> &[u64];

    /// Sets one of the first eight chunks. `index` must be below
    /// [`ENCODED_NAME_CHUNKS`].
    fn set_encoded_name_chunk(&mut self, index: usize, chunk: u64);

    fn push_encoded_name_additional(&mut self, chunk: u64);

    fn decoded_name(&self) -> String {
        decode_string(
            &self.encoded_name_chunks(),
            self.encoded_name_additional(),
        )
    }
}

/// Encodes `source` into `sink`, stopping at the end of the input or at the
/// first zero byte. The sink is expected to be freshly constructed.
pub fn encode_string<S: EncodedName + ?Sized>(source: &[u8], sink: &mut S) {
    let len = source.iter().position(|&b| b == 0).unwrap_or(source.len());

    for (index, bytes) in source[..len].chunks(CHUNK_BYTES).enumerate() {
        let chunk = bytes
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, &b)| acc | u64::from(b) << (56 - 8 * i));
        if index < ENCODED_NAME_CHUNKS {
            sink.set_encoded_name_chunk(index, chunk);
        } else {
            sink.push_encoded_name_additional(chunk);
        }
    }
}

pub fn decode_string_bytes(chunks: &[u64; ENCODED_NAME_CHUNKS], additional: &[u64]) -> Vec<u8> {
    let mut result = Vec::new();
    for chunk in chunks.iter().chain(additional) {
        for shift in (0..CHUNK_BYTES).rev() {
            let byte = (chunk >> (shift * 8)) as u8;
            if byte == 0 {
                return result;
            }
            result.push(byte);
        }
    }
    result
}

/// Decodes an encoded name. Invalid UTF-8 is replaced lossily.
pub fn decode_string(chunks: &[u64; ENCODED_NAME_CHUNKS], additional: &[u64]) -> String {
    String::from_utf8_lossy(&decode_string_bytes(chunks, additional)).into_owned()
}

macro_rules! impl_encoded_name {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::encoded_string::EncodedName for $ty {
            fn encoded_name_chunks(&self) -> [u64; $crate::encoded_string::ENCODED_NAME_CHUNKS] {
                [
                    self.encoded_name_1,
                    self.encoded_name_2,
                    self.encoded_name_3,
                    self.encoded_name_4,
                    self.encoded_name_5,
                    self.encoded_name_6,
                    self.encoded_name_7,
                    self.encoded_name_8,
                ]
            }

            fn encoded_name_additional(&self) -> &[u64] {
                &self.encoded_name_additional
            }

            fn set_encoded_name_chunk(&mut self, index: usize, chunk: u64) {
                match index {
                    0 => self.encoded_name_1 = chunk,
                    1 => self.encoded_name_2 = chunk,
                    2 => self.encoded_name_3 = chunk,
                    3 => self.encoded_name_4 = chunk,
                    4 => self.encoded_name_5 = chunk,
                    5 => self.encoded_name_6 = chunk,
                    6 => self.encoded_name_7 = chunk,
                    7 => self.encoded_name_8 = chunk,
                    _ => panic!("encoded name chunk index {} out of range", index),
                }
            }

            fn push_encoded_name_additional(&mut self, chunk: u64) {
                self.encoded_name_additional.push(chunk);
            }
        }
    )+};
}

pub(crate) use impl_encoded_name;
