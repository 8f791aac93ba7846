use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use phf::phf_set;

use crate::mock::MockObjClass;

/// Names that resolution must never hand out: C++ keywords plus the symbols
/// the generated translation unit itself defines or pulls in from the
/// runtime.
pub static RESERVED_IDENTIFIERS: phf::Set<&'static str> = phf_set! {
    // C++ keywords, per http://en.cppreference.com/w/cpp/keyword
    "alignas", "alignof", "and", "and_eq", "asm", "auto", "bitand", "bitor",
    "bool", "break", "case", "catch", "char", "char16_t", "char32_t",
    "class", "compl", "concept", "const", "constexpr", "const_cast",
    "continue", "decltype", "default", "delete", "do", "double",
    "dynamic_cast", "else", "enum", "explicit", "export", "extern", "false",
    "float", "for", "friend", "goto", "if", "inline", "int", "long",
    "mutable", "namespace", "new", "noexcept", "not", "not_eq", "nullptr",
    "operator", "or", "or_eq", "private", "protected", "public", "register",
    "reinterpret_cast", "requires", "return", "short", "signed", "sizeof",
    "static", "static_assert", "static_cast", "struct", "switch", "template",
    "this", "thread_local", "throw", "true", "try", "typedef", "typeid",
    "typename", "union", "unsigned", "using", "virtual", "void", "volatile",
    "wchar_t", "while", "xor", "xor_eq",
    // Symbols owned by the generated main and the ember runtime
    "App", "setup", "loop", "id", "delay", "delayMicroseconds", "millis",
    "micros", "pinMode", "digitalRead", "digitalWrite", "INPUT", "OUTPUT",
    "HIGH", "LOW",
};

/// Appends `_2`, `_3`, ... until the name no longer collides with `used`.
pub fn ensure_unique_string(value: &str, used: &HashSet<String>) -> String {
    let mut ret = value.to_string();
    let mut i = 2;
    while used.contains(&ret) {
        ret = format!("{value}_{i}");
        i += 1;
    }
    ret
}

#[derive(Debug)]
struct IdentInner {
    name: RefCell<Option<String>>,
    class: Option<MockObjClass>,
    is_declaration: bool,
    is_manual: bool,
}

/// A handle for a configuration identifier. Clones share the underlying
/// state, so resolving an anonymous handle once names every copy of it.
///
/// An `Ident` is only a name in the configuration, never a C++ symbol by
/// itself. The accumulator decides what symbol a binding gets.
#[derive(Clone, Debug)]
pub struct Ident {
    inner: Rc<IdentInner>,
}

impl Ident {
    fn from_parts(
        name: Option<String>,
        class: Option<MockObjClass>,
        is_declaration: bool,
        is_manual: bool,
    ) -> Self {
        Ident {
            inner: Rc::new(IdentInner {
                name: RefCell::new(name),
                class,
                is_declaration,
                is_manual,
            }),
        }
    }

    /// A named reference with no type, as produced by `id(...)` in lambdas.
    pub fn new(name: impl Into<String>) -> Self {
        Ident::from_parts(Some(name.into()), None, false, true)
    }

    /// An unnamed declaration. Resolution derives a name from the type.
    pub fn anonymous(class: MockObjClass) -> Self {
        Ident::from_parts(None, Some(class), true, false)
    }

    /// A user-named declaration of the given type.
    pub fn declared(name: impl Into<String>, class: MockObjClass) -> Self {
        Ident::from_parts(Some(name.into()), Some(class), true, true)
    }

    /// A user-written reference expected to match a declaration elsewhere.
    pub fn reference(name: impl Into<String>, class: MockObjClass) -> Self {
        Ident::from_parts(Some(name.into()), Some(class), false, true)
    }

    pub fn name(&self) -> Option<String> {
        self.inner.name.borrow().clone()
    }

    pub fn class(&self) -> Option<&MockObjClass> {
        self.inner.class.as_ref()
    }

    pub fn is_declaration(&self) -> bool {
        self.inner.is_declaration
    }

    pub fn is_manual(&self) -> bool {
        self.inner.is_manual
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.name.borrow().is_some()
    }

    /// A copy of this handle with a different type. The copy snapshots the
    /// current name; it does not stay linked to the original.
    pub fn with_class(&self, class: MockObjClass) -> Ident {
        Ident::from_parts(
            self.name(),
            Some(class),
            self.inner.is_declaration,
            self.inner.is_manual,
        )
    }

    /// Returns this identifier's name, inventing one first if necessary.
    ///
    /// The invented name is derived from the type (`foo::BarSensor` becomes
    /// `foo_barsensor`), then disambiguated against `used` and the reserved
    /// set by appending the smallest free integer suffix. Once resolved the
    /// name sticks; later calls return it unchanged.
    pub fn resolve(&self, used: &HashSet<String>) -> String {
        if let Some(name) = self.name() {
            return name;
        }

        let base: String = self
            .inner
            .class
            .as_ref()
            .map(|class| class.to_string().replace("::", "_").to_lowercase())
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        let base = if base.is_empty() {
            "var".to_string()
        } else {
            base
        };

        let mut name = base.clone();
        let mut i = 2;
        while used.contains(&name) || RESERVED_IDENTIFIERS.contains(name.as_str()) {
            name = format!("{base}_{i}");
            i += 1;
        }

        *self.inner.name.borrow_mut() = Some(name.clone());
        name
    }
}

impl PartialEq for Ident {
    fn eq(&self, other: &Self) -> bool {
        match (self.name(), other.name()) {
            (Some(a), Some(b)) => a == b,
            // Unresolved handles are only equal to themselves
            _ => Rc::ptr_eq(&self.inner, &other.inner),
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.inner.name.borrow() {
            Some(name) => f.write_str(name),
            None => Ok(()),
        }
    }
}
