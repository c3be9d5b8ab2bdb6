// ============================================================================
// 原生对象生命周期
// 脚本可见的原生对象统一登记在 ObjectRegistry 中，按 id 间接访问
// ============================================================================

use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::logging::CHANNEL_LIFECYCLE;
use crate::scripting::registry::ScriptClass;
use crate::scripting::value::{NativeTag, ScriptHandle};

/// 脚本中可以精确表示的最大整数 (2^53)
const MAX_SAFE_ID: u64 = 1 << 53;

/// 原生对象标识
///
/// 由 `ObjectRegistry` 单调递增分配，从 1 开始，只用于簿记。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    /// 在脚本中的数值形式
    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }

    /// 从脚本数值还原，非正整数或超出精确范围时返回 None
    pub fn from_f64(value: f64) -> Option<Self> {
        if value.is_finite() && value >= 1.0 && value.fract() == 0.0 && value <= MAX_SAFE_ID as f64 {
            Some(Self(value as u64))
        } else {
            None
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 所有权归属，在构造时由入口决定，之后不可更改
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// 原生代码持有并负责销毁，脚本只是观察者
    NativeOwned,
    /// 由脚本 `new` 创建，回收器通过终结器负责销毁
    ScriptOwned,
}

/// 原生对象的共享引用
pub type NativeRef<T> = Rc<RefCell<T>>;

/// 脚本持有对象的租约
///
/// 每个指向该对象的包装对象各持有一份，最后一份被回收时守卫析构，对象随之销毁。
pub type ScriptLease = Rc<FinalizerGuard>;

enum Owner {
    Native(Weak<dyn Any>),
    Script { value: Rc<dyn Any>, lease: Weak<FinalizerGuard> },
}

struct Slot {
    type_name: &'static str,
    owner: Owner,
}

impl Slot {
    fn ownership(&self) -> Ownership {
        match self.owner {
            Owner::Native(_) => Ownership::NativeOwned,
            Owner::Script { .. } => Ownership::ScriptOwned,
        }
    }
}

/// 原生对象登记表
///
/// 脚本侧包装对象只保存 id 和类型名，所有访问都要经过这里：
/// 对象被销毁后对应条目随之移除，残留的包装对象因此变为惰性，
/// 不会再触及已释放的内存。
pub struct ObjectRegistry {
    next_id: Cell<u64>,
    slots: RefCell<HashMap<ObjectId, Slot>>,
    /// 已释放、但脚本侧缓存尚未清理的原生对象
    released: RefCell<Vec<ObjectId>>,
    /// 终结时登记表正被借用，延后处理
    pending_finalize: RefCell<Vec<ObjectId>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            slots: RefCell::new(HashMap::new()),
            released: RefCell::new(Vec::new()),
            pending_finalize: RefCell::new(Vec::new()),
        }
    }

    fn allocate_id(&self) -> ObjectId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        ObjectId(id)
    }

    /// 登记一个由原生代码持有的对象
    pub fn adopt_native<T: ScriptClass>(self: &Rc<Self>, value: T) -> NativeObject<T> {
        let id = self.allocate_id();
        let shared: NativeRef<T> = Rc::new(RefCell::new(value));
        let erased: Rc<dyn Any> = shared.clone();
        self.slots.borrow_mut().insert(
            id,
            Slot {
                type_name: T::NAME,
                owner: Owner::Native(Rc::downgrade(&erased)),
            },
        );
        tracing::debug!(target: CHANNEL_LIFECYCLE, "adopted native-owned {} {}", T::NAME, id);

        NativeObject {
            id,
            value: shared,
            registry: Rc::clone(self),
        }
    }

    /// 登记一个由脚本回收器持有的对象
    ///
    /// 返回第一份租约，应当交给脚本侧包装对象的终结器持有。
    pub fn adopt_script<T: ScriptClass>(self: &Rc<Self>, value: T) -> (ObjectId, ScriptLease) {
        let id = self.allocate_id();
        let shared: Rc<dyn Any> = Rc::new(RefCell::new(value));
        let lease = Rc::new(FinalizerGuard {
            id,
            registry: Rc::downgrade(self),
        });
        self.slots.borrow_mut().insert(
            id,
            Slot {
                type_name: T::NAME,
                owner: Owner::Script {
                    value: shared,
                    lease: Rc::downgrade(&lease),
                },
            },
        );
        tracing::debug!(target: CHANNEL_LIFECYCLE, "adopted script-owned {} {}", T::NAME, id);

        (id, lease)
    }

    /// 为脚本持有对象的另一个包装对象取得租约，对象已销毁或不是脚本持有时返回 None
    pub fn lease(&self, id: ObjectId) -> Option<ScriptLease> {
        match &self.slots.borrow().get(&id)?.owner {
            Owner::Script { lease, .. } => lease.upgrade(),
            Owner::Native(_) => None,
        }
    }

    /// 按标记查找原生对象，类型名或实际类型不符、对象已销毁时返回 None
    pub fn resolve<T: ScriptClass>(&self, tag: &NativeTag) -> Option<NativeRef<T>> {
        if tag.type_name != T::NAME {
            return None;
        }
        let erased = {
            let slots = self.slots.borrow();
            let slot = slots.get(&tag.id)?;
            if slot.type_name != T::NAME {
                return None;
            }
            match &slot.owner {
                Owner::Native(weak) => weak.upgrade()?,
                Owner::Script { value, .. } => Rc::clone(value),
            }
        };
        erased.downcast::<RefCell<T>>().ok()
    }

    /// 对象是否仍然存活
    pub fn contains(&self, id: ObjectId) -> bool {
        self.slots.borrow().contains_key(&id)
    }

    pub fn ownership(&self, id: ObjectId) -> Option<Ownership> {
        self.slots.borrow().get(&id).map(Slot::ownership)
    }

    pub fn type_name(&self, id: ObjectId) -> Option<&'static str> {
        self.slots.borrow().get(&id).map(|slot| slot.type_name)
    }

    /// 当前登记的对象数
    pub fn live_objects(&self) -> usize {
        self.slots.borrow().len()
    }

    /// 取出等待脚本侧清理的 id
    pub(crate) fn take_released(&self) -> Vec<ObjectId> {
        self.flush_pending();
        std::mem::take(&mut *self.released.borrow_mut())
    }

    fn release(&self, id: ObjectId) {
        let removed = self.slots.borrow_mut().remove(&id);
        if let Some(slot) = removed {
            tracing::debug!(target: CHANNEL_LIFECYCLE, "released native-owned {} {}", slot.type_name, id);
            self.released.borrow_mut().push(id);
        }
    }

    fn finalize(&self, id: ObjectId) {
        let removed = match self.slots.try_borrow_mut() {
            Ok(mut slots) => slots.remove(&id),
            Err(_) => {
                self.pending_finalize.borrow_mut().push(id);
                return;
            }
        };
        // 在借用之外析构，对象的 Drop 可能再次访问登记表
        if let Some(slot) = removed {
            tracing::debug!(target: CHANNEL_LIFECYCLE, "finalized script-owned {} {}", slot.type_name, id);
            drop(slot);
        }
    }

    fn flush_pending(&self) {
        let pending = std::mem::take(&mut *self.pending_finalize.borrow_mut());
        for id in pending {
            self.finalize(id);
        }
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("next_id", &self.next_id.get())
            .field("live_objects", &self.live_objects())
            .finish()
    }
}

/// 原生持有的脚本可见对象
///
/// 被丢弃时通知登记表，之后脚本侧的包装对象即失效。
pub struct NativeObject<T: ScriptClass> {
    id: ObjectId,
    value: NativeRef<T>,
    registry: Rc<ObjectRegistry>,
}

impl<T: ScriptClass> NativeObject<T> {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn tag(&self) -> NativeTag {
        NativeTag::new(self.id, T::NAME)
    }

    /// 带标记的对象值，可作为参数或返回值交给脚本
    pub fn handle(&self) -> ScriptHandle {
        ScriptHandle::tagged_object(self.tag())
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.value.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.value.borrow_mut()
    }
}

impl<T: ScriptClass> Drop for NativeObject<T> {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

impl<T: ScriptClass + fmt::Debug> fmt::Debug for NativeObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeObject")
            .field("id", &self.id)
            .field("value", &self.value)
            .finish()
    }
}

/// 脚本持有对象的终结守卫
///
/// 只通过 [`ScriptLease`] 共享，恰好被丢弃一次；丢弃时从登记表移除并销毁对象，
/// 全程不会回调脚本运行时。
pub struct FinalizerGuard {
    id: ObjectId,
    registry: Weak<ObjectRegistry>,
}

impl FinalizerGuard {
    pub fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl Drop for FinalizerGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.finalize(self.id);
        }
    }
}

impl fmt::Debug for FinalizerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FinalizerGuard").field(&self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripting::registry::{EnumTable, FunctionTable};

    thread_local! {
        static DROPS: Cell<usize> = const { Cell::new(0) };
    }

    struct Marker(u32);

    impl Drop for Marker {
        fn drop(&mut self) {
            DROPS.with(|d| d.set(d.get() + 1));
        }
    }

    impl ScriptClass for Marker {
        const NAME: &'static str = "Marker";
        fn register_functions(_table: &mut FunctionTable) {}
        fn register_enums(_table: &mut EnumTable) {}
    }

    struct Other;

    impl ScriptClass for Other {
        const NAME: &'static str = "Other";
        fn register_functions(_table: &mut FunctionTable) {}
        fn register_enums(_table: &mut EnumTable) {}
    }

    fn drops() -> usize {
        DROPS.with(|d| d.get())
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let registry = Rc::new(ObjectRegistry::new());
        let a = registry.adopt_native(Other);
        let b = registry.adopt_native(Other);
        let (c, _guard) = registry.adopt_script(Other);
        assert!(a.id() < b.id());
        assert!(b.id() < c);
    }

    #[test]
    fn test_native_owned_release() {
        let registry = Rc::new(ObjectRegistry::new());
        let object = registry.adopt_native(Marker(7));
        let tag = object.tag();
        assert_eq!(registry.ownership(object.id()), Some(Ownership::NativeOwned));
        assert_eq!(registry.resolve::<Marker>(&tag).unwrap().borrow().0, 7);

        let before = drops();
        drop(object);
        assert_eq!(drops(), before + 1);
        assert!(registry.resolve::<Marker>(&tag).is_none());
        assert_eq!(registry.take_released(), vec![tag.id]);
        assert!(registry.take_released().is_empty());
    }

    #[test]
    fn test_script_owned_finalized_once() {
        let registry = Rc::new(ObjectRegistry::new());
        let before = drops();
        let (id, guard) = registry.adopt_script(Marker(1));
        assert_eq!(registry.ownership(id), Some(Ownership::ScriptOwned));
        assert_eq!(registry.live_objects(), 1);

        drop(guard);
        assert_eq!(drops(), before + 1);
        assert_eq!(registry.live_objects(), 0);
        // 脚本持有的对象不进入清理队列
        assert!(registry.take_released().is_empty());
    }

    #[test]
    fn test_script_owned_waits_for_last_lease() {
        let registry = Rc::new(ObjectRegistry::new());
        let before = drops();
        let (id, first) = registry.adopt_script(Marker(4));
        let second = registry.lease(id).unwrap();
        assert!(Rc::ptr_eq(&first, &second));

        drop(first);
        assert_eq!(drops(), before);
        assert_eq!(registry.resolve::<Marker>(&NativeTag::new(id, "Marker")).unwrap().borrow().0, 4);

        drop(second);
        assert_eq!(drops(), before + 1);
        assert!(registry.lease(id).is_none());
    }

    #[test]
    fn test_native_owned_has_no_lease() {
        let registry = Rc::new(ObjectRegistry::new());
        let object = registry.adopt_native(Other);
        assert!(registry.lease(object.id()).is_none());
    }

    #[test]
    fn test_resolve_rejects_wrong_type() {
        let registry = Rc::new(ObjectRegistry::new());
        let object = registry.adopt_native(Other);
        assert!(registry.resolve::<Marker>(&object.tag()).is_none());

        let forged = NativeTag::new(object.id(), "Marker");
        assert!(registry.resolve::<Marker>(&forged).is_none());
        assert!(registry.resolve::<Other>(&object.tag()).is_some());
    }

    #[test]
    fn test_guard_outliving_registry() {
        let registry = Rc::new(ObjectRegistry::new());
        let (_, guard) = registry.adopt_script(Other);
        drop(registry);
        drop(guard);
    }

    #[test]
    fn test_object_id_from_f64() {
        assert_eq!(ObjectId::from_f64(3.0), Some(ObjectId::from_raw(3)));
        assert_eq!(ObjectId::from_f64(0.0), None);
        assert_eq!(ObjectId::from_f64(1.5), None);
        assert_eq!(ObjectId::from_f64(f64::NAN), None);
        assert_eq!(ObjectId::from_raw(12).to_string(), "#12");
    }
}
