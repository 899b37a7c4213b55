//! Conversions between typed fields and parameter values.

use std::any::type_name;
use std::str::FromStr;

use crate::routing::error::LocationError;

/// Decode a field from every value recorded under its name.
pub trait FromParameterValues: Sized {
    fn from_values(name: &str, values: &[String]) -> Result<Self, LocationError>;
}

/// Encode a field as zero or more parameter values.
pub trait ToParameterValues {
    fn to_values(&self) -> Vec<String>;
}

fn single<T>(name: &str, values: &[String]) -> Result<T, LocationError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = values.first().ok_or_else(|| LocationError::MissingParameter {
        name: name.to_string(),
        type_name: type_name::<T>().to_string(),
    })?;
    value.parse::<T>().map_err(|err| LocationError::ParameterConversion {
        name: name.to_string(),
        type_name: type_name::<T>().to_string(),
        reason: format!("`{value}`: {err}"),
    })
}

macro_rules! scalar_conversions {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromParameterValues for $ty {
                fn from_values(name: &str, values: &[String]) -> Result<Self, LocationError> {
                    single(name, values)
                }
            }

            impl ToParameterValues for $ty {
                fn to_values(&self) -> Vec<String> {
                    vec![self.to_string()]
                }
            }
        )*
    };
}

scalar_conversions!(
    String, bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
);

impl<T: FromParameterValues> FromParameterValues for Option<T> {
    fn from_values(name: &str, values: &[String]) -> Result<Self, LocationError> {
        if values.is_empty() {
            return Ok(None);
        }
        T::from_values(name, values).map(Some)
    }
}

impl<T: ToParameterValues> ToParameterValues for Option<T> {
    fn to_values(&self) -> Vec<String> {
        self.as_ref().map(ToParameterValues::to_values).unwrap_or_default()
    }
}

impl<T: FromParameterValues> FromParameterValues for Vec<T> {
    fn from_values(name: &str, values: &[String]) -> Result<Self, LocationError> {
        values
            .iter()
            .map(|value| T::from_values(name, std::slice::from_ref(value)))
            .collect()
    }
}

impl<T: ToParameterValues> ToParameterValues for Vec<T> {
    fn to_values(&self) -> Vec<String> {
        self.iter().flat_map(ToParameterValues::to_values).collect()
    }
}

impl ToParameterValues for &str {
    fn to_values(&self) -> Vec<String> {
        vec![(*self).to_string()]
    }
}
