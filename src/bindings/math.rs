// ============================================================================
// 数学绑定
// Vec2 / Vec3 (glam) 以及 Axis 枚举
// ============================================================================

use glam::{Vec2, Vec3};

use crate::core::BridgeResult;
use crate::script_enum;
use crate::scripting::{
    Constructor, EnumTable, FromScript, FunctionTable, ScriptArgs, ScriptClass, ScriptScope,
};

script_enum! {
    /// 坐标轴
    pub enum Axis {
        X = 0,
        Y = 1,
        Z = 2,
    }
}

/// 脚本中的 `Vec2`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScriptVec2(pub Vec2);

/// 脚本中的 `Vec3`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScriptVec3(pub Vec3);

fn axis_arg(args: &ScriptArgs<'_>, index: usize) -> Option<Axis> {
    if !args.check("N") {
        return None;
    }
    let handle = args.get_handle(index)?;
    match Axis::from_script(&handle) {
        Ok(axis) => Some(axis),
        Err(err) => {
            tracing::warn!(target: crate::core::logging::CHANNEL_SCRIPT, "{}: {}", args.function_name(), err);
            None
        }
    }
}

/// 为向量类型生成分量读写函数
macro_rules! vector_accessors {
    ($ty:ident { $($field:ident: $get:ident, $set:ident;)+ }) => {
        $(
            fn $get(args: &mut ScriptArgs<'_>) -> bool {
                let Some(this) = args.get_self::<$ty>() else {
                    return false;
                };
                let value = this.borrow().0.$field;
                args.add_return(value);
                true
            }

            fn $set(args: &mut ScriptArgs<'_>) -> bool {
                if !args.check("N") {
                    return false;
                }
                let Some(this) = args.get_self::<$ty>() else {
                    return false;
                };
                this.borrow_mut().0.$field = args.get(0, 0.0f32);
                true
            }
        )+
    };
}

// ==================== Vec2 ====================

vector_accessors!(ScriptVec2 {
    x: vec2_get_x, vec2_set_x;
    y: vec2_get_y, vec2_set_y;
});

fn vec2_self(args: &ScriptArgs<'_>) -> Option<Vec2> {
    args.get_self::<ScriptVec2>().map(|v| v.borrow().0)
}

fn vec2_arg(args: &ScriptArgs<'_>, index: usize) -> Option<Vec2> {
    args.get_pointer::<ScriptVec2>(index).map(|v| v.borrow().0)
}

fn vec2_new(args: &mut ScriptArgs<'_>) -> Option<ScriptVec2> {
    if args.is_empty() {
        return Some(ScriptVec2::default());
    }
    if !args.check("NN") {
        return None;
    }
    Some(ScriptVec2(Vec2::new(args.get(0, 0.0), args.get(1, 0.0))))
}

fn vec2_length(args: &mut ScriptArgs<'_>) -> bool {
    let Some(v) = vec2_self(args) else {
        return false;
    };
    args.add_return(v.length());
    true
}

fn vec2_normalize(args: &mut ScriptArgs<'_>) -> bool {
    let Some(v) = vec2_self(args) else {
        return false;
    };
    args.add_return_owned(ScriptVec2(v.normalize_or_zero()));
    true
}

fn vec2_add(args: &mut ScriptArgs<'_>) -> bool {
    let (Some(a), Some(b)) = (vec2_self(args), vec2_arg(args, 0)) else {
        return false;
    };
    args.add_return_owned(ScriptVec2(a + b));
    true
}

fn vec2_scale(args: &mut ScriptArgs<'_>) -> bool {
    if !args.check("N") {
        return false;
    }
    let Some(v) = vec2_self(args) else {
        return false;
    };
    let factor: f32 = args.get(0, 1.0);
    args.add_return_owned(ScriptVec2(v * factor));
    true
}

fn vec2_dot(args: &mut ScriptArgs<'_>) -> bool {
    let (Some(a), Some(b)) = (vec2_self(args), vec2_arg(args, 0)) else {
        return false;
    };
    args.add_return(a.dot(b));
    true
}

fn vec2_to_array(args: &mut ScriptArgs<'_>) -> bool {
    let Some(v) = vec2_self(args) else {
        return false;
    };
    args.add_return(v.to_array().to_vec());
    true
}

fn vec2_component(args: &mut ScriptArgs<'_>) -> bool {
    let Some(v) = vec2_self(args) else {
        return false;
    };
    match axis_arg(args, 0) {
        Some(Axis::X) => args.add_return(v.x),
        Some(Axis::Y) => args.add_return(v.y),
        Some(Axis::Z) | None => return false,
    }
    true
}

impl ScriptClass for ScriptVec2 {
    const NAME: &'static str = "Vec2";

    fn register_functions(table: &mut FunctionTable) {
        table
            .add("get_x", vec2_get_x)
            .add("set_x", vec2_set_x)
            .add("get_y", vec2_get_y)
            .add("set_y", vec2_set_y)
            .add("length", vec2_length)
            .add("normalize", vec2_normalize)
            .add("add", vec2_add)
            .add("scale", vec2_scale)
            .add("dot", vec2_dot)
            .add("to_array", vec2_to_array)
            .add("component", vec2_component);
    }

    fn register_enums(table: &mut EnumTable) {
        table.add_enum::<Axis>();
    }

    fn constructor() -> Option<Constructor<Self>> {
        Some(vec2_new)
    }
}

// ==================== Vec3 ====================

vector_accessors!(ScriptVec3 {
    x: vec3_get_x, vec3_set_x;
    y: vec3_get_y, vec3_set_y;
    z: vec3_get_z, vec3_set_z;
});

fn vec3_self(args: &ScriptArgs<'_>) -> Option<Vec3> {
    args.get_self::<ScriptVec3>().map(|v| v.borrow().0)
}

fn vec3_arg(args: &ScriptArgs<'_>, index: usize) -> Option<Vec3> {
    args.get_pointer::<ScriptVec3>(index).map(|v| v.borrow().0)
}

fn vec3_new(args: &mut ScriptArgs<'_>) -> Option<ScriptVec3> {
    if args.is_empty() {
        return Some(ScriptVec3::default());
    }
    if !args.check("NNN") {
        return None;
    }
    Some(ScriptVec3(Vec3::new(args.get(0, 0.0), args.get(1, 0.0), args.get(2, 0.0))))
}

fn vec3_length(args: &mut ScriptArgs<'_>) -> bool {
    let Some(v) = vec3_self(args) else {
        return false;
    };
    args.add_return(v.length());
    true
}

fn vec3_normalize(args: &mut ScriptArgs<'_>) -> bool {
    let Some(v) = vec3_self(args) else {
        return false;
    };
    args.add_return_owned(ScriptVec3(v.normalize_or_zero()));
    true
}

fn vec3_add(args: &mut ScriptArgs<'_>) -> bool {
    let (Some(a), Some(b)) = (vec3_self(args), vec3_arg(args, 0)) else {
        return false;
    };
    args.add_return_owned(ScriptVec3(a + b));
    true
}

fn vec3_scale(args: &mut ScriptArgs<'_>) -> bool {
    if !args.check("N") {
        return false;
    }
    let Some(v) = vec3_self(args) else {
        return false;
    };
    let factor: f32 = args.get(0, 1.0);
    args.add_return_owned(ScriptVec3(v * factor));
    true
}

fn vec3_dot(args: &mut ScriptArgs<'_>) -> bool {
    let (Some(a), Some(b)) = (vec3_self(args), vec3_arg(args, 0)) else {
        return false;
    };
    args.add_return(a.dot(b));
    true
}

fn vec3_cross(args: &mut ScriptArgs<'_>) -> bool {
    let (Some(a), Some(b)) = (vec3_self(args), vec3_arg(args, 0)) else {
        return false;
    };
    args.add_return_owned(ScriptVec3(a.cross(b)));
    true
}

fn vec3_to_array(args: &mut ScriptArgs<'_>) -> bool {
    let Some(v) = vec3_self(args) else {
        return false;
    };
    args.add_return(v.to_array().to_vec());
    true
}

fn vec3_component(args: &mut ScriptArgs<'_>) -> bool {
    let Some(v) = vec3_self(args) else {
        return false;
    };
    let Some(axis) = axis_arg(args, 0) else {
        return false;
    };
    let value = match axis {
        Axis::X => v.x,
        Axis::Y => v.y,
        Axis::Z => v.z,
    };
    args.add_return(value);
    true
}

impl ScriptClass for ScriptVec3 {
    const NAME: &'static str = "Vec3";

    fn register_functions(table: &mut FunctionTable) {
        table
            .add("get_x", vec3_get_x)
            .add("set_x", vec3_set_x)
            .add("get_y", vec3_get_y)
            .add("set_y", vec3_set_y)
            .add("get_z", vec3_get_z)
            .add("set_z", vec3_set_z)
            .add("length", vec3_length)
            .add("normalize", vec3_normalize)
            .add("add", vec3_add)
            .add("scale", vec3_scale)
            .add("dot", vec3_dot)
            .add("cross", vec3_cross)
            .add("to_array", vec3_to_array)
            .add("component", vec3_component);
    }

    fn register_enums(table: &mut EnumTable) {
        table.add_enum::<Axis>();
    }

    fn constructor() -> Option<Constructor<Self>> {
        Some(vec3_new)
    }
}

/// 注册 `Axis`、`Vec2`、`Vec3`
pub fn register(scope: &ScriptScope<'_>) -> BridgeResult<()> {
    scope.register_enum::<Axis>()?;
    scope.register::<ScriptVec2>()?;
    scope.register::<ScriptVec3>()?;
    Ok(())
}
