/// Declares an entity struct and implements [`TrackedEntity`](crate::TrackedEntity) for it.
///
/// Every field is tracked unless marked `#[track(skip)]`; fields marked
/// `#[track(key)]` form the primary key in declaration order. Tracked field
/// types must implement [`TrackedValue`](crate::TrackedValue), and every field
/// type must implement `Default` so blank instances can be built. The macro
/// derives `Clone` and generates a `new` taking all fields in order. Field
/// attributes other than `#[track(..)]` are consumed, not re-emitted.
///
/// ```
/// memorm::tracked_entity! {
///     #[derive(Debug, PartialEq)]
///     pub struct Employee {
///         #[track(key)]
///         pub id: i64,
///         pub name: String,
///         #[track(skip)]
///         pub notes: Vec<String>,
///     }
/// }
///
/// use memorm::TrackedEntity;
/// let descriptor = Employee::descriptor();
/// assert_eq!(descriptor.field_count(), 2);
/// ```
#[macro_export]
macro_rules! tracked_entity {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$($field_meta:tt)*])*
                $field_vis:vis $field:ident : $field_ty:ty
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $name {
            $( $field_vis $field: $field_ty, )+
        }

        impl $name {
            /// Builds an entity from all of its fields, in declaration order.
            #[allow(clippy::too_many_arguments)]
            pub fn new($($field: $field_ty),+) -> Self {
                Self {
                    $( $field, )+
                }
            }
        }

        impl $crate::TrackedEntity for $name {
            #[allow(unused_mut)]
            fn descriptor() -> $crate::EntityDescriptor {
                let mut fields = ::std::vec::Vec::new();
                $(
                    $crate::__track_if_tracked!([$(#[$($field_meta)*])*]
                        fields.push($crate::FieldDescriptor::of::<$field_ty>(
                            stringify!($field),
                            $crate::__track_field_is_key!($(#[$($field_meta)*])*),
                        ));
                    );
                )+
                $crate::EntityDescriptor::new(stringify!($name), fields)
            }

            fn read_field(&self, field: &str) -> ::std::option::Option<$crate::FieldValue> {
                $(
                    $crate::__track_if_tracked!([$(#[$($field_meta)*])*]
                        if field == stringify!($field) {
                            return ::std::option::Option::Some(
                                $crate::TrackedValue::to_field_value(&self.$field),
                            );
                        }
                    );
                )+
                ::std::option::Option::None
            }

            #[allow(unused_variables)]
            fn write_field(
                &mut self,
                field: &str,
                value: $crate::FieldValue,
            ) -> $crate::Result<()> {
                $(
                    $crate::__track_if_tracked!([$(#[$($field_meta)*])*]
                        if field == stringify!($field) {
                            let found = value.type_name();
                            self.$field = <$field_ty as $crate::TrackedValue>::from_field_value(value)
                                .ok_or_else(|| {
                                    $crate::field_kind_mismatch(stringify!($name), field, found)
                                })?;
                            return ::std::result::Result::Ok(());
                        }
                    );
                )+
                ::std::result::Result::Err($crate::TrackError::Inconsistent(format!(
                    "'{}' has no trackable field '{}'",
                    stringify!($name),
                    field
                )))
            }

            fn blank() -> $crate::Result<Self> {
                ::std::result::Result::Ok(Self {
                    $( $field: ::std::default::Default::default(), )+
                })
            }
        }
    };
}
