use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Tag identifying the numeric representation of one sample.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    F32,
    F64,
    U8,
    I8,
    I16,
    I24,
    I32,
    I64,
}

impl SampleFormat {
    pub const ALL: [SampleFormat; 8] = [
        SampleFormat::F32,
        SampleFormat::F64,
        SampleFormat::U8,
        SampleFormat::I8,
        SampleFormat::I16,
        SampleFormat::I24,
        SampleFormat::I32,
        SampleFormat::I64,
    ];

    /// Size of one sample in bytes.
    pub const fn size(self) -> usize {
        match self {
            SampleFormat::U8 | SampleFormat::I8 => 1,
            SampleFormat::I16 => 2,
            SampleFormat::I24 => 3,
            SampleFormat::F32 | SampleFormat::I32 => 4,
            SampleFormat::F64 | SampleFormat::I64 => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, SampleFormat::F32 | SampleFormat::F64)
    }

    /// Runs `visitor` with the concrete sample type behind this tag.
    pub fn visit<V: FormatVisitor>(self, visitor: V) -> V::Output {
        match self {
            SampleFormat::F32 => visitor.visit::<f32>(),
            SampleFormat::F64 => visitor.visit::<f64>(),
            SampleFormat::U8 => visitor.visit::<u8>(),
            SampleFormat::I8 => visitor.visit::<i8>(),
            SampleFormat::I16 => visitor.visit::<i16>(),
            SampleFormat::I24 => visitor.visit::<I24>(),
            SampleFormat::I32 => visitor.visit::<i32>(),
            SampleFormat::I64 => visitor.visit::<i64>(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            SampleFormat::F32 => "float32",
            SampleFormat::F64 => "float64",
            SampleFormat::U8 => "unsigned int8",
            SampleFormat::I8 => "signed int8",
            SampleFormat::I16 => "signed int16",
            SampleFormat::I24 => "signed int24",
            SampleFormat::I32 => "signed int32",
            SampleFormat::I64 => "signed int64",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("unknown sample format: {0}")]
pub struct UnknownSampleFormat(pub String);

impl FromStr for SampleFormat {
    type Err = UnknownSampleFormat;

    fn from_str(s: &str) -> Result<SampleFormat, UnknownSampleFormat> {
        Ok(match s {
            "f32" | "float32" => SampleFormat::F32,
            "f64" | "float64" => SampleFormat::F64,
            "u8" | "unsigned int8" => SampleFormat::U8,
            "i8" | "signed int8" => SampleFormat::I8,
            "i16" | "signed int16" => SampleFormat::I16,
            "i24" | "signed int24" => SampleFormat::I24,
            "i32" | "signed int32" => SampleFormat::I32,
            "i64" | "signed int64" => SampleFormat::I64,
            _ => return Err(UnknownSampleFormat(s.into())),
        })
    }
}

/// Generic operation selected at runtime by [`SampleFormat::visit`].
pub trait FormatVisitor {
    type Output;

    fn visit<S: Sample>(self) -> Self::Output;
}

mod private {
    pub trait Sealed {}
}

/// A concrete sample type.
///
/// Implemented only for the types listed in [`SampleFormat`]; using anything else as a stream's
/// sample type is a compile error.
pub trait Sample:
    private::Sealed + Copy + Send + Sync + PartialEq + fmt::Debug + Default + 'static
{
    const FORMAT: SampleFormat;

    /// The value representing silence.
    const EQUILIBRIUM: Self;

    /// Converts from a normalized `[-1.0, 1.0]` amplitude. Integer formats saturate.
    fn from_f64(value: f64) -> Self;

    /// Converts to a normalized `[-1.0, 1.0]` amplitude.
    fn to_f64(self) -> f64;
}

macro_rules! impl_float_sample {
    ($ty:ty, $format:ident) => {
        impl private::Sealed for $ty {}

        impl Sample for $ty {
            const FORMAT: SampleFormat = SampleFormat::$format;
            const EQUILIBRIUM: Self = 0.0;

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

macro_rules! impl_int_sample {
    ($ty:ty, $format:ident) => {
        impl private::Sealed for $ty {}

        impl Sample for $ty {
            const FORMAT: SampleFormat = SampleFormat::$format;
            const EQUILIBRIUM: Self = 0;

            #[inline]
            fn from_f64(value: f64) -> Self {
                (value.clamp(-1.0, 1.0) * <$ty>::MAX as f64).round() as $ty
            }

            #[inline]
            fn to_f64(self) -> f64 {
                (self as f64 / <$ty>::MAX as f64).max(-1.0)
            }
        }
    };
}

impl_float_sample!(f32, F32);
impl_float_sample!(f64, F64);
impl_int_sample!(i8, I8);
impl_int_sample!(i16, I16);
impl_int_sample!(i32, I32);
impl_int_sample!(i64, I64);

impl private::Sealed for u8 {}

impl Sample for u8 {
    const FORMAT: SampleFormat = SampleFormat::U8;
    const EQUILIBRIUM: Self = 128;

    #[inline]
    fn from_f64(value: f64) -> Self {
        ((value.clamp(-1.0, 1.0) * 127.0).round() + 128.0) as u8
    }

    #[inline]
    fn to_f64(self) -> f64 {
        ((self as f64 - 128.0) / 127.0).max(-1.0)
    }
}

/// Packed 24-bit signed integer sample, stored little-endian.
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct I24([u8; 3]);

impl I24 {
    pub const MIN: i32 = -(1 << 23);
    pub const MAX: i32 = (1 << 23) - 1;

    /// Creates a sample from `value`, saturating to the 24-bit range.
    pub const fn new(value: i32) -> I24 {
        let value = if value < I24::MIN {
            I24::MIN
        } else if value > I24::MAX {
            I24::MAX
        } else {
            value
        };

        let bytes = value.to_le_bytes();
        I24([bytes[0], bytes[1], bytes[2]])
    }

    pub const fn get(self) -> i32 {
        let [a, b, c] = self.0;
        // sign-extend from the top byte
        i32::from_le_bytes([a, b, c, 0]) << 8 >> 8
    }

    pub const fn to_le_bytes(self) -> [u8; 3] {
        self.0
    }

    pub const fn from_le_bytes(bytes: [u8; 3]) -> I24 {
        I24(bytes)
    }
}

impl fmt::Debug for I24 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("I24").field(&self.get()).finish()
    }
}

impl From<I24> for i32 {
    fn from(value: I24) -> i32 {
        value.get()
    }
}

impl private::Sealed for I24 {}

impl Sample for I24 {
    const FORMAT: SampleFormat = SampleFormat::I24;
    const EQUILIBRIUM: Self = I24([0; 3]);

    #[inline]
    fn from_f64(value: f64) -> Self {
        I24::new((value.clamp(-1.0, 1.0) * I24::MAX as f64).round() as i32)
    }

    #[inline]
    fn to_f64(self) -> f64 {
        (self.get() as f64 / I24::MAX as f64).max(-1.0)
    }
}

#[cfg(test)]
mod tests {
    use std::mem::size_of;

    use super::*;

    struct FormatOf;

    impl FormatVisitor for FormatOf {
        type Output = (SampleFormat, usize);

        fn visit<S: Sample>(self) -> Self::Output {
            (S::FORMAT, size_of::<S>())
        }
    }

    #[test]
    fn format_type_round_trip() {
        for format in SampleFormat::ALL {
            let (back, size) = format.visit(FormatOf);
            assert_eq!(back, format);
            assert_eq!(size, format.size());
        }
    }

    #[test]
    fn format_parse_display() {
        for format in SampleFormat::ALL {
            assert_eq!(format.to_string().parse::<SampleFormat>(), Ok(format));
        }

        assert_eq!("i24".parse::<SampleFormat>(), Ok(SampleFormat::I24));
        assert!("u16".parse::<SampleFormat>().is_err());
    }

    #[test]
    fn i24_saturates_and_sign_extends() {
        assert_eq!(I24::new(-1).get(), -1);
        assert_eq!(I24::new(1234567).get(), 1234567);
        assert_eq!(I24::new(i32::MAX).get(), I24::MAX);
        assert_eq!(I24::new(i32::MIN).get(), I24::MIN);
        assert_eq!(I24::from_le_bytes(I24::new(-42).to_le_bytes()).get(), -42);
    }

    fn check_conversion<S: Sample>() {
        assert_eq!(S::EQUILIBRIUM.to_f64(), 0.0, "{}", S::FORMAT);
        assert_eq!(S::from_f64(0.0), S::EQUILIBRIUM, "{}", S::FORMAT);
        assert!((S::from_f64(1.0).to_f64() - 1.0).abs() < 1e-6, "{}", S::FORMAT);
        assert!((S::from_f64(-1.0).to_f64() + 1.0).abs() < 1e-6, "{}", S::FORMAT);
        if !S::FORMAT.is_float() {
            assert_eq!(S::from_f64(4.0), S::from_f64(1.0), "{}", S::FORMAT);
        }
    }

    #[test]
    fn normalized_conversion() {
        check_conversion::<f32>();
        check_conversion::<f64>();
        check_conversion::<u8>();
        check_conversion::<i8>();
        check_conversion::<i16>();
        check_conversion::<I24>();
        check_conversion::<i32>();
        check_conversion::<i64>();
    }
}
