//! 方法与类型的静态描述
//!
//! Rust 没有运行时反射，连接点的"方法身份"和"目标类型信息"由宏在编译期生成为常量。

use std::fmt;

/// 方法身份
///
/// 描述一个可被拦截的方法：声明类型、方法名、参数个数，以及是否为 final（不可被子类代理覆盖）
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Method {
    declaring_type: &'static str,
    name: &'static str,
    arity: usize,
    is_final: bool,
}

impl Method {
    pub const fn new(declaring_type: &'static str, name: &'static str, arity: usize) -> Self {
        Self {
            declaring_type,
            name,
            arity,
            is_final: false,
        }
    }

    /// 标记为 final 方法
    pub const fn as_final(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn declaring_type(&self) -> &'static str {
        self.declaring_type
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// 完整的方法签名，例如 `UserService::find_user`
    pub fn signature(&self) -> String {
        format!("{}::{}", self.declaring_type, self.name)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("signature", &self.signature())
            .field("arity", &self.arity)
            .field("is_final", &self.is_final)
            .finish()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)
    }
}

/// 被代理的接口（trait）描述
#[derive(Debug, PartialEq, Eq)]
pub struct InterfaceInfo {
    name: &'static str,
    methods: &'static [Method],
}

impl InterfaceInfo {
    pub const fn new(name: &'static str, methods: &'static [Method]) -> Self {
        Self { name, methods }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn methods(&self) -> &'static [Method] {
        self.methods
    }

    pub fn find_method(&self, name: &str) -> Option<&'static Method> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// 目标类型描述
///
/// 类过滤器（ClassFilter）针对它进行匹配
#[derive(Debug, PartialEq, Eq)]
pub struct TargetClass {
    name: &'static str,
    interfaces: &'static [&'static InterfaceInfo],
    methods: &'static [Method],
    is_final: bool,
}

impl TargetClass {
    pub const fn new(
        name: &'static str,
        interfaces: &'static [&'static InterfaceInfo],
        methods: &'static [Method],
        is_final: bool,
    ) -> Self {
        Self {
            name,
            interfaces,
            methods,
            is_final,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn interfaces(&self) -> &'static [&'static InterfaceInfo] {
        self.interfaces
    }

    pub fn has_interfaces(&self) -> bool {
        !self.interfaces.is_empty()
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i.name == interface)
    }

    /// 类型自身声明的方法（不含接口方法）
    pub fn methods(&self) -> &'static [Method] {
        self.methods
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// 接口方法在前，自身方法在后
    pub fn all_methods(&self) -> impl Iterator<Item = &'static Method> {
        self.interfaces
            .iter()
            .flat_map(|i| i.methods.iter())
            .chain(self.methods.iter())
    }

    /// 按声明类型和方法名查找方法
    pub fn resolve(&self, declaring_type: &str, name: &str) -> Option<&'static Method> {
        if declaring_type == self.name {
            return self.methods.iter().find(|m| m.name == name);
        }
        self.interfaces
            .iter()
            .find(|i| i.name == declaring_type)
            .and_then(|i| i.find_method(name))
    }

    /// 按方法名查找，接口方法优先
    pub fn find_method(&self, name: &str) -> Option<&'static Method> {
        self.all_methods().find(|m| m.name == name)
    }
}

impl fmt::Display for TargetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static GREETING: InterfaceInfo =
        InterfaceInfo::new("GreetingService", &[Method::new("GreetingService", "greet", 1)]);

    static GREETER: TargetClass = TargetClass::new(
        "Greeter",
        &[&GREETING],
        &[
            Method::new("Greeter", "greet", 1),
            Method::new("Greeter", "version", 0).as_final(),
        ],
        false,
    );

    #[test]
    fn test_signature() {
        let method = Method::new("UserService", "find_user", 1);
        assert_eq!(method.signature(), "UserService::find_user");
        assert_eq!(method.to_string(), "UserService::find_user");
        assert!(!method.is_final());
        assert!(method.as_final().is_final());
    }

    #[test]
    fn test_resolve_methods() {
        assert!(GREETER.implements("GreetingService"));
        assert!(!GREETER.implements("AuditService"));

        let from_interface = GREETER.resolve("GreetingService", "greet").unwrap();
        assert_eq!(from_interface.declaring_type(), "GreetingService");

        let own = GREETER.resolve("Greeter", "version").unwrap();
        assert!(own.is_final());

        assert!(GREETER.resolve("Greeter", "missing").is_none());
        assert_eq!(GREETER.all_methods().count(), 3);
        assert_eq!(
            GREETER.find_method("greet").unwrap().declaring_type(),
            "GreetingService"
        );
    }
}
