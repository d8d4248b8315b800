/// Convenience macro for creating [`Document`](crate::Document) values.
///
/// Mostly useful for tests and demos. Arrays and objects nest; everything
/// else goes through `Document::from`.
///
/// ```rust
/// # use otson::doc;
/// let profile = doc!({
///     "name": "Ada",
///     "logins": 41,
///     "tags": ["ot", "json"],
///     "active": true
/// });
/// let empty = doc!(null);
/// let numbers = doc!([1, 2, 3]);
/// ```
#[macro_export]
macro_rules! doc {
    (null) => {
        $crate::Document::Null
    };

    ([ $( $element:tt ),* $(,)? ]) => {
        $crate::Document::Array(vec![ $( $crate::doc!($element) ),* ])
    };

    ({ $( $key:literal : $value:tt ),* $(,)? }) => {{
        let mut map = ::std::collections::BTreeMap::new();
        $( map.insert($key.to_string(), $crate::doc!($value)); )*
        $crate::Document::Object(map)
    }};

    ($other:expr) => {
        $crate::Document::from($other)
    };
}
