//! Fail-fast invariant checks.
//!
//! `assume!` is for programmer errors only: registry misuse, pointers that
//! cannot belong to an allocator, indices past the end of an [`Array`].
//! Running out of space is never reported through here; that is what
//! [`AllocError`] is for.
//!
//! [`Array`]: crate::Array
//! [`AllocError`]: crate::AllocError

/// Expands to the path of the enclosing function, e.g.
/// `scratchring::registry::default_allocator`.
#[doc(hidden)]
#[macro_export]
macro_rules! function_path {
  () => {{
    fn f() {}
    fn type_name_of<T>(_: T) -> &'static str {
      ::core::any::type_name::<T>()
    }
    let name = type_name_of(f);
    name.strip_suffix("::f").unwrap_or(name)
  }};
}

/// Checks a condition and terminates the process if it does not hold.
///
/// The failing expression, source location and enclosing function are
/// reported before the process aborts. An optional format string adds
/// context.
///
/// ```rust,no_run
/// use scratchring::assume;
///
/// let index = 3;
/// assume!(index < 2, "index {} out of range", index);
/// ```
#[macro_export]
macro_rules! assume {
  ($cond:expr $(,)?) => {
    if !$cond {
      $crate::assume::assumption_failed(
        stringify!($cond),
        file!(),
        line!(),
        $crate::function_path!(),
        None,
      );
    }
  };
  ($cond:expr, $($arg:tt)+) => {
    if !$cond {
      $crate::assume::assumption_failed(
        stringify!($cond),
        file!(),
        line!(),
        $crate::function_path!(),
        Some(format_args!($($arg)+)),
      );
    }
  };
}

/// Reports a failed assumption and aborts.
#[cold]
#[inline(never)]
pub fn assumption_failed(
  expression: &str,
  file: &str,
  line: u32,
  function: &str,
  message: Option<std::fmt::Arguments<'_>>,
) -> ! {
  match message {
    Some(message) => {
      tracing::error!(expression, file, line, function, %message, "assumption failed");
      eprintln!(
        "Assumption \"{}\" failed in file {}:{} in function {}: {}",
        expression, file, line, function, message
      );
    }
    None => {
      tracing::error!(expression, file, line, function, "assumption failed");
      eprintln!(
        "Assumption \"{}\" failed in file {}:{} in function {}",
        expression, file, line, function
      );
    }
  }

  std::process::abort()
}
