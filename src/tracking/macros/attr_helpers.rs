#[macro_export]
#[doc(hidden)]
macro_rules! __track_if_tracked {
    ([] $($body:tt)*) => {
        $($body)*
    };
    ([#[track(skip)] $($rest:tt)*] $($body:tt)*) => {};
    ([#[ $($_other:tt)* ] $($rest:tt)*] $($body:tt)*) => {
        $crate::__track_if_tracked!([$($rest)*] $($body)*);
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! __track_field_is_key {
    () => {
        false
    };
    (#[track(key)] $($rest:tt)*) => {
        true
    };
    (#[ $($_other:tt)* ] $($rest:tt)*) => {
        $crate::__track_field_is_key!($($rest)*)
    };
}
