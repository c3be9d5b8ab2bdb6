//! 核心宏定义
//!
//! 提供统一的宏来减少代码重复

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// use engine_script_bridge::impl_default;
///
/// struct MyStruct {
///     field1: u32,
///     field2: String,
/// }
///
/// impl_default!(MyStruct {
///     field1: 0,
///     field2: String::new(),
/// });
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}

/// 声明一个可以跨越脚本边界的枚举
///
/// 生成的枚举实现 [`ScriptEnum`](crate::scripting::ScriptEnum)、
/// [`IntoHandle`](crate::scripting::IntoHandle) 和
/// [`FromScript`](crate::scripting::FromScript)，在脚本中以数值形式出现。
///
/// 使用示例:
/// ```rust
/// use engine_script_bridge::script_enum;
///
/// script_enum! {
///     pub enum BlendMode {
///         Opaque = 0,
///         Additive = 1,
///     }
/// }
/// ```
#[macro_export]
macro_rules! script_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $crate::scripting::ScriptEnum for $name {
            const NAME: &'static str = stringify!($name);
            const ENTRIES: &'static [(&'static str, i64)] = &[$((stringify!($variant), $value)),+];

            fn to_number(self) -> i64 {
                match self {
                    $($name::$variant => $value),+
                }
            }

            fn from_number(value: i64) -> Option<Self> {
                $(
                    if value == $value {
                        return Some($name::$variant);
                    }
                )+
                None
            }
        }

        impl $crate::scripting::IntoHandle for $name {
            fn into_handle(self) -> $crate::scripting::ScriptHandle {
                let number = <$name as $crate::scripting::ScriptEnum>::to_number(self);
                $crate::scripting::ScriptHandle::number(number as f64)
            }
        }

        impl $crate::scripting::FromScript for $name {
            fn from_script(
                value: &$crate::scripting::ScriptValue,
            ) -> ::std::result::Result<Self, $crate::core::ConversionError> {
                let number = <i64 as $crate::scripting::FromScript>::from_script(value)?;
                <$name as $crate::scripting::ScriptEnum>::from_number(number).ok_or(
                    $crate::core::ConversionError::UnknownVariant {
                        value: number,
                        target: stringify!($name),
                    },
                )
            }
        }
    };
}
