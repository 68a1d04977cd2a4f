//! 连接点（JoinPoint）定义
//!
//! 连接点表示一次具体的方法执行，通知钩子通过它读取方法、参数和目标对象

use crate::method::{Method, TargetClass};
use crate::value::Args;
use std::any::Any;
use std::fmt;

/// 连接点信息
///
/// 只在一次调用期间有效的借用视图
#[derive(Clone, Copy)]
pub struct JoinPoint<'a> {
    method: &'static Method,
    args: &'a Args,
    target: &'a (dyn Any + Send + Sync),
    target_class: &'static TargetClass,
}

impl<'a> JoinPoint<'a> {
    pub fn new(
        method: &'static Method,
        args: &'a Args,
        target: &'a (dyn Any + Send + Sync),
        target_class: &'static TargetClass,
    ) -> Self {
        Self {
            method,
            args,
            target,
            target_class,
        }
    }

    pub fn method(&self) -> &'static Method {
        self.method
    }

    pub fn method_name(&self) -> &'static str {
        self.method.name()
    }

    pub fn args(&self) -> &'a Args {
        self.args
    }

    pub fn target_class(&self) -> &'static TargetClass {
        self.target_class
    }

    /// 目标类型名称
    pub fn target_type(&self) -> &'static str {
        self.target_class.name()
    }

    /// 尝试以具体类型访问目标对象
    pub fn target<T: Any>(&self) -> Option<&'a T> {
        self.target.downcast_ref::<T>()
    }

    /// 获取完整的方法签名
    pub fn signature(&self) -> String {
        self.method.signature()
    }
}

impl fmt::Debug for JoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("target_type", &self.target_type())
            .field("signature", &self.signature())
            .field("args", self.args)
            .finish()
    }
}

impl fmt::Display for JoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.method)
    }
}
