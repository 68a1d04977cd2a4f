//! 参数与返回值
//!
//! 参数列表在一次调用内不可变、可廉价克隆；重复调用 `proceed()` 时可以安全复用。

use crate::error::DispatchError;
use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
struct ArgValue {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

/// 方法参数
#[derive(Clone)]
pub struct Args {
    values: Arc<[ArgValue]>,
}

impl Args {
    pub fn empty() -> Self {
        Self {
            values: Arc::from(Vec::new()),
        }
    }

    pub fn builder() -> ArgsBuilder {
        ArgsBuilder { values: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 按位置借用参数
    pub fn get<T: Any>(&self, index: usize) -> Result<&T, DispatchError> {
        let arg = self.values.get(index).ok_or(DispatchError::MissingArgument {
            index,
            len: self.values.len(),
        })?;
        arg.value
            .downcast_ref::<T>()
            .ok_or(DispatchError::ArgumentType {
                index,
                expected: type_name::<T>(),
                actual: arg.type_name,
            })
    }

    /// 按位置取出参数的副本
    pub fn cloned<T: Any + Clone>(&self, index: usize) -> Result<T, DispatchError> {
        self.get::<T>(index).cloned()
    }

    pub fn type_name(&self, index: usize) -> Option<&'static str> {
        self.values.get(index).map(|a| a.type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.iter().map(|a| a.type_name)
    }
}

impl Default for Args {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.type_names()).finish()
    }
}

/// [`Args`] 构建器
pub struct ArgsBuilder {
    values: Vec<ArgValue>,
}

impl ArgsBuilder {
    pub fn arg<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.values.push(ArgValue {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        });
        self
    }

    pub fn build(self) -> Args {
        Args {
            values: Arc::from(self.values),
        }
    }
}

/// 方法成功返回的值
pub struct ReturnValue {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ReturnValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
        }
    }

    pub fn unit() -> Self {
        Self::new(())
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn downcast<T: Any>(self) -> Result<T, DispatchError> {
        let actual = self.type_name;
        self.value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| DispatchError::ReturnType {
                expected: type_name::<T>(),
                actual,
            })
    }
}

impl fmt::Debug for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnValue")
            .field("type", &self.type_name)
            .finish()
    }
}
