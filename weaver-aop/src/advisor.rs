//! Advisor：切点 + 通知
//!
//! 在代理配置中的位置即优先级，先添加的在外层执行

use crate::advice::Advice;
use crate::pointcut::{Pointcut, TruePointcut};
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct Advisor {
    pointcut: Arc<dyn Pointcut>,
    advice: Advice,
}

impl Advisor {
    pub fn new(pointcut: Arc<dyn Pointcut>, advice: Advice) -> Self {
        Self { pointcut, advice }
    }

    /// 匹配所有方法的 advisor
    pub fn for_all(advice: Advice) -> Self {
        Self::new(Arc::new(TruePointcut), advice)
    }

    pub fn pointcut(&self) -> &Arc<dyn Pointcut> {
        &self.pointcut
    }

    pub fn advice(&self) -> &Advice {
        &self.advice
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor")
            .field("advice", &self.advice)
            .finish_non_exhaustive()
    }
}
