//! Well-known configuration keys.

pub const CONF_ID: &str = "id";
pub const CONF_TYPE: &str = "type";
pub const CONF_TYPE_ID: &str = "type_id";
pub const CONF_NAME: &str = "name";
pub const CONF_PLATFORM: &str = "platform";
pub const CONF_PIN: &str = "pin";
pub const CONF_NUMBER: &str = "number";
pub const CONF_MODE: &str = "mode";
pub const CONF_INVERTED: &str = "inverted";
pub const CONF_LAMBDA: &str = "lambda";
pub const CONF_INITIAL_VALUE: &str = "initial_value";
pub const CONF_UPDATE_INTERVAL: &str = "update_interval";
pub const CONF_SETUP_PRIORITY: &str = "setup_priority";
pub const CONF_TRIGGER_ID: &str = "trigger_id";
