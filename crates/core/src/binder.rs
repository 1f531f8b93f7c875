//! Binding of untyped JSON argument lists to typed action parameters.
//!
//! Rules:
//! - a fixed parameter list fails with [`BindError::InsufficientArguments`] when the payload
//!   is shorter than the list, and ignores any extra trailing arguments;
//! - a trailing [`Variadic`] parameter collects every argument from its position onward,
//!   each checked against the element type, and is empty when nothing is supplied;
//! - a value whose shape does not fit the declared type fails with
//!   [`BindError::ArgumentTypeMismatch`] naming its position.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Failure to bind a payload to an action's parameters.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("Not enough arguments, expected {expected} but received {actual}")]
    InsufficientArguments { expected: usize, actual: usize },
    #[error("Argument {position} has an unexpected type: {source}")]
    ArgumentTypeMismatch {
        position: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Parameter list of an action, bound from a JSON argument array.
pub trait ActionArgs: Sized {
    /// Number of leading parameters that must be present.
    const REQUIRED: usize;

    /// Bind `args` to this parameter list.
    fn bind(args: &[Value]) -> Result<Self, BindError>;
}

/// Trailing repeated parameter; zero supplied arguments bind to an empty list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variadic<T>(pub Vec<T>);

impl<T> Default for Variadic<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> Variadic<T> {
    pub fn into_inner(self) -> Vec<T> {
        self.0
    }

    pub fn first(&self) -> Option<&T> {
        self.0.first()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Fail unless at least `required` arguments were supplied.
pub fn check_arity(required: usize, actual: usize) -> Result<(), BindError> {
    if actual < required {
        return Err(BindError::InsufficientArguments {
            expected: required,
            actual,
        });
    }
    Ok(())
}

/// Convert the argument at `position` to `T`.
///
/// Deserializing straight from the `Value` is equivalent to re-encoding it as JSON and
/// decoding into `T`, without the intermediate buffer.
pub fn bind_at<T: DeserializeOwned>(args: &[Value], position: usize) -> Result<T, BindError> {
    let raw = args.get(position).ok_or(BindError::InsufficientArguments {
        expected: position + 1,
        actual: args.len(),
    })?;
    T::deserialize(raw).map_err(|source| BindError::ArgumentTypeMismatch { position, source })
}

/// Collect every argument from `from` onward as `T`.
pub fn bind_rest<T: DeserializeOwned>(args: &[Value], from: usize) -> Result<Variadic<T>, BindError> {
    args.iter()
        .enumerate()
        .skip(from)
        .map(|(position, raw)| {
            T::deserialize(raw)
                .map_err(|source| BindError::ArgumentTypeMismatch { position, source })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Variadic)
}

macro_rules! fixed_args {
    ($count:expr; $($ty:ident : $idx:tt),*) => {
        impl<$($ty: DeserializeOwned),*> ActionArgs for ($($ty,)*) {
            const REQUIRED: usize = $count;

            fn bind(args: &[Value]) -> Result<Self, BindError> {
                check_arity(Self::REQUIRED, args.len())?;
                Ok(($(bind_at::<$ty>(args, $idx)?,)*))
            }
        }
    };
}

fixed_args!(0;);
fixed_args!(1; A: 0);
fixed_args!(2; A: 0, B: 1);
fixed_args!(3; A: 0, B: 1, C: 2);
fixed_args!(4; A: 0, B: 1, C: 2, D: 3);
fixed_args!(5; A: 0, B: 1, C: 2, D: 3, E: 4);

impl<T: DeserializeOwned> ActionArgs for Variadic<T> {
    const REQUIRED: usize = 0;

    fn bind(args: &[Value]) -> Result<Self, BindError> {
        bind_rest(args, 0)
    }
}
