use crate::{Error, Result};

/// 文件系统参数
#[derive(Debug, Clone, PartialEq)]
pub struct FsConfig {
    /// i-list 占设备总块数的比例，仅格式化时使用
    pub ilist_percentage: f64,
    /// 路径解析时最多跟随的符号链接层数
    pub max_symlink_depth: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            ilist_percentage: 0.1,
            max_symlink_depth: 8,
        }
    }
}

impl FsConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.ilist_percentage > 0.0 && self.ilist_percentage < 1.0) {
            return Err(Error::InvalidArgument("ilist percentage must be in (0, 1)"));
        }
        Ok(())
    }
}
