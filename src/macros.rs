/// Typed accessors for fields with no default: `name()` returns `None` when
/// the field is absent, `set_name()` validates and marks the owner dirty.
macro_rules! optional_fields {
    ($($(#[$meta:meta])* $name:ident: $ty:ty = $key:literal;)*) => {
        paste::paste! {
            $(
                #[doc = concat!("The `", $key, "` field, if set.")]
                $(#[$meta])*
                pub fn $name(&self) -> Option<$ty> {
                    $crate::tracking::read_field(self, $key)
                }

                #[doc = concat!("Validates and stores the `", $key, "` field.")]
                pub fn [<set_ $name>](
                    &self,
                    value: impl Into<$ty>,
                ) -> Result<(), $crate::ContextError> {
                    $crate::tracking::write_field::<$ty>(self, $key, value.into())
                }
            )*
        }
    };
}

/// Typed accessors for fields that always read as a value, falling back to
/// the field's default (or the type's default) when absent.
macro_rules! defaulted_fields {
    ($($(#[$meta:meta])* $name:ident: $ty:ty = $key:literal;)*) => {
        paste::paste! {
            $(
                #[doc = concat!("The `", $key, "` field, or its default.")]
                $(#[$meta])*
                pub fn $name(&self) -> $ty {
                    $crate::tracking::read_field::<$ty>(self, $key).unwrap_or_default()
                }

                #[doc = concat!("Validates and stores the `", $key, "` field.")]
                pub fn [<set_ $name>](
                    &self,
                    value: impl Into<$ty>,
                ) -> Result<(), $crate::ContextError> {
                    $crate::tracking::write_field::<$ty>(self, $key, value.into())
                }
            )*
        }
    };
}

/// The boilerplate tying a facade struct to its record: construction over a
/// record and the `Any` upcast used for ancestor lookups.
macro_rules! facade {
    ($ty:ident, $kind:expr) => {
        impl $crate::tracking::Facade for $ty {
            const KIND: $crate::schema::Kind = $kind;

            fn from_record(record: $crate::record::RecordRef) -> std::rc::Rc<Self> {
                std::rc::Rc::new_cyclic(|this: &std::rc::Weak<$ty>| {
                    let this: std::rc::Weak<dyn $crate::tracking::Tracked> = this.clone();
                    $ty::build($crate::tracking::ObjectCore::new(record, this))
                })
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("core", $crate::tracking::Tracked::core(self))
                    .finish()
            }
        }
    };
}
