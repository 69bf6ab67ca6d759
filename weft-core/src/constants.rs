/// 核心常量定义
///
/// 这个模块定义了组件元数据中使用的注解名称与特殊类型名称，
/// 确保在容器、织入层和用户代码中使用相同的标识符，避免硬编码和不一致的问题

/// 切面标记注解
pub const ASPECT_ANNOTATION: &str = "weft.Aspect";

/// 环绕通知注解，值为切点表达式
pub const AROUND_ANNOTATION: &str = "weft.Around";

/// 通知优先级注解，值为整数，数字越小优先级越高
pub const PRIVILEGE_ANNOTATION: &str = "weft.Privilege";

/// 作用域注解，值为 "singleton" 或 "prototype"
pub const SCOPE_ANNOTATION: &str = "weft.Scope";

/// 分配（构造）连接点的方法名
pub const NEW_METHOD_NAME: &str = "new";

/// 初始化连接点的方法名
pub const INIT_METHOD_NAME: &str = "init";

/// 通用对象类型，通知方法必须以它作为返回类型
pub const VALUE_TYPE_NAME: &str = "weft.Value";

/// 无返回值
pub const UNIT_TYPE_NAME: &str = "()";

/// 注入结果的类型名称，作为分配连接点的唯一参数
pub const WIRING_TYPE_NAME: &str = "weft.Wiring";

/// 通知方法可接受的连接点参数类型
pub const JOIN_POINT_TYPE_NAMES: &[&str] = &[
    "weft.aop.JoinPoint",
    "weft.aop.ProceedingJoinPoint",
    "weft.aop.AutowireJoinPoint",
];

/// 检查给定的类型名称是否为连接点参数类型
///
/// # Example
/// ```
/// use weft_core::constants::is_join_point_type_name;
///
/// assert!(is_join_point_type_name("weft.aop.ProceedingJoinPoint"));
/// assert!(!is_join_point_type_name("com.acme.Service"));
/// ```
pub fn is_join_point_type_name(type_name: &str) -> bool {
    JOIN_POINT_TYPE_NAMES.contains(&type_name)
}
