//! Key mapping schemes: five abstract roles resolved to concrete key ids.
//!
//! A [`KeyMappingScheme`] can only be built with every role populated, so an
//! activated scheme is always complete. Raw (possibly incomplete) tables live
//! in the [`SchemeRegistry`] until someone tries to activate them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pose::Direction;

/// キー識別子（キー送出側に渡す名前）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key(String);

impl Key {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 抽象的なキーの役割
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    Jump,
    RunThrow,
    Left,
    Right,
    Down,
}

impl KeyRole {
    pub const ALL: [KeyRole; 5] = [
        KeyRole::Jump,
        KeyRole::RunThrow,
        KeyRole::Left,
        KeyRole::Right,
        KeyRole::Down,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyRole::Jump => "jump",
            KeyRole::RunThrow => "run_throw",
            KeyRole::Left => "left",
            KeyRole::Right => "right",
            KeyRole::Down => "down",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemeError {
    #[error("scheme {scheme:?} has no key for role {role:?}")]
    MissingRole { scheme: String, role: &'static str },
    #[error("scheme {scheme:?} maps role {role:?} to an empty key")]
    EmptyKey { scheme: String, role: &'static str },
    #[error("scheme {scheme:?} defines unknown role {role:?}")]
    UnknownRole { scheme: String, role: String },
    #[error("unknown scheme {0:?}")]
    UnknownScheme(String),
}

/// 検証済みキー割り当て
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMappingScheme {
    name: String,
    jump: Key,
    run_throw: Key,
    left: Key,
    right: Key,
    down: Key,
}

impl KeyMappingScheme {
    /// 役割名 → キーの表から構築する。役割が一つでも欠けていればエラー
    pub fn from_roles(name: &str, roles: &BTreeMap<String, String>) -> Result<Self, SchemeError> {
        if let Some(unknown) = roles
            .keys()
            .find(|k| !KeyRole::ALL.iter().any(|r| r.as_str() == k.as_str()))
        {
            return Err(SchemeError::UnknownRole {
                scheme: name.to_string(),
                role: unknown.clone(),
            });
        }
        let lookup = |role: KeyRole| -> Result<Key, SchemeError> {
            let id = roles.get(role.as_str()).ok_or_else(|| SchemeError::MissingRole {
                scheme: name.to_string(),
                role: role.as_str(),
            })?;
            let id = id.trim();
            if id.is_empty() {
                return Err(SchemeError::EmptyKey {
                    scheme: name.to_string(),
                    role: role.as_str(),
                });
            }
            Ok(Key::new(id))
        };
        Ok(Self {
            name: name.to_string(),
            jump: lookup(KeyRole::Jump)?,
            run_throw: lookup(KeyRole::RunThrow)?,
            left: lookup(KeyRole::Left)?,
            right: lookup(KeyRole::Right)?,
            down: lookup(KeyRole::Down)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self, role: KeyRole) -> &Key {
        match role {
            KeyRole::Jump => &self.jump,
            KeyRole::RunThrow => &self.run_throw,
            KeyRole::Left => &self.left,
            KeyRole::Right => &self.right,
            KeyRole::Down => &self.down,
        }
    }

    pub fn direction_key(&self, direction: Direction) -> &Key {
        match direction {
            Direction::Left => &self.left,
            Direction::Right => &self.right,
        }
    }

    /// RetroArch (NES コア) の既定割り当て
    pub fn retroarch() -> Self {
        Self::preset("retroarch", ["x", "y", "left", "right", "down"])
    }

    /// ブラウザ版の割り当て
    pub fn web() -> Self {
        Self::preset("web", ["up", "ctrl", "left", "right", "down"])
    }

    /// ユーザー設定が無い場合のカスタム割り当て
    pub fn custom_default() -> Self {
        Self::preset("custom", ["space", "shift", "a", "d", "s"])
    }

    fn preset(name: &str, keys: [&str; 5]) -> Self {
        let [jump, run_throw, left, right, down] = keys.map(Key::new);
        Self {
            name: name.to_string(),
            jump,
            run_throw,
            left,
            right,
            down,
        }
    }

    pub fn to_roles(&self) -> BTreeMap<String, String> {
        KeyRole::ALL
            .iter()
            .map(|r| (r.as_str().to_string(), self.key(*r).as_str().to_string()))
            .collect()
    }
}

impl Default for KeyMappingScheme {
    fn default() -> Self {
        Self::retroarch()
    }
}

/// 名前付きスキームの一覧（未検証の表を保持し、取り出し時に検証する）
#[derive(Debug, Clone)]
pub struct SchemeRegistry {
    schemes: BTreeMap<String, BTreeMap<String, String>>,
}

impl SchemeRegistry {
    /// 組み込みスキームのみ
    pub fn builtin() -> Self {
        let schemes = [
            KeyMappingScheme::retroarch(),
            KeyMappingScheme::web(),
            KeyMappingScheme::custom_default(),
        ]
        .into_iter()
        .map(|s| (s.name().to_string(), s.to_roles()))
        .collect();
        Self { schemes }
    }

    /// 組み込み + 設定ファイルのスキーム（同名は設定側で置き換え）
    pub fn with_overrides(overrides: &BTreeMap<String, BTreeMap<String, String>>) -> Self {
        let mut registry = Self::builtin();
        for (name, roles) in overrides {
            registry.insert(name, roles.clone());
        }
        registry
    }

    pub fn insert(&mut self, name: &str, roles: BTreeMap<String, String>) {
        self.schemes.insert(name.to_ascii_lowercase(), roles);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemes.keys().map(String::as_str)
    }

    /// 名前（大文字小文字無視）で検証済みスキームを取り出す
    pub fn resolve(&self, name: &str) -> Result<KeyMappingScheme, SchemeError> {
        let key = name.trim().to_ascii_lowercase();
        let roles = self
            .schemes
            .get(&key)
            .ok_or_else(|| SchemeError::UnknownScheme(name.to_string()))?;
        KeyMappingScheme::from_roles(&key, roles)
    }
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
