use binrw::{BinRead, BinWrite};

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The file identifier stored as the bytes `2LGA`.
pub const GLA_IDENT: u32 = u32::from_le_bytes(*b"2LGA");

/// The only supported file version.
pub const GLA_VERSION: u32 = 6;

/// The size in bytes of [GlaHeader].
pub const HEADER_SIZE: usize = 100;

/// The size in bytes of fixed length names.
pub const NAME_LENGTH: usize = 64;

/// A fixed length, null padded name.
#[derive(BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
pub struct GlaName(pub [u8; NAME_LENGTH]);

impl GlaName {
    /// Creates a name from `text` truncated to leave room for a null terminator.
    /**
    ```rust
    use gla_lib::GlaName;

    let name = GlaName::new("model_root");
    assert_eq!("model_root", name.to_string_lossy());
    ```
    */
    pub fn new(text: &str) -> Self {
        let mut bytes = [0u8; NAME_LENGTH];
        let len = text.len().min(NAME_LENGTH - 1);
        bytes[..len].copy_from_slice(&text.as_bytes()[..len]);
        Self(bytes)
    }

    /// Converts the bytes up to the first null byte to a string.
    /// Invalid UTF-8 sequences are replaced.
    pub fn to_string_lossy(&self) -> String {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(NAME_LENGTH);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl std::fmt::Debug for GlaName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

#[cfg(feature = "serde")]
impl Serialize for GlaName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_lossy())
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for GlaName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::new(&text))
    }
}

/// The fixed size header at the start of every GLA file.
/// Offsets are in bytes from the start of the file.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(BinRead, BinWrite, Debug, PartialEq, Clone)]
#[brw(little)]
pub struct GlaHeader {
    /// The file identifier, which should be [GLA_IDENT].
    pub ident: u32,
    pub version: u32,
    pub name: GlaName,
    /// The declared scale of the animation data.
    /// This is informational and not applied to decoded translations.
    pub scale: f32,
    pub frame_count: i32,
    /// The start of the 3 byte frame index table.
    pub frames_offset: i32,
    pub bone_count: i32,
    /// The start of the compressed bone pool.
    pub bone_pool_offset: i32,
    /// The start of the bone offset table.
    pub skeleton_offset: i32,
    /// The end of the data.
    pub end_offset: i32,
}
