//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use arc_swap::ArcSwap;
use bytes::{Bytes, BytesMut};

use crate::debug::Debug;
use crate::packet::attribute::{self, AttrCodec};
use crate::packet::nlri::{self, NlriCodec};
use crate::packet::tlv::{self, InfoTlvCodec, StatTlvCodec};

// A family of wire objects sharing the same discriminator space.
//
// `object_key` returns the runtime variant tag of an object, which is what the
// serializer lookup is keyed on.
pub trait Codec: Send + Sync + 'static {
    const NAME: &'static str;

    type Key: Copy + Ord + std::fmt::Debug + Send + Sync + 'static;
    type Object;
    type DecodeCxt;
    type EncodeCxt;
    type Error;

    fn object_key(object: &Self::Object) -> Self::Key;
}

pub type Parser<C> = Arc<
    dyn Fn(
            &mut Bytes,
            &<C as Codec>::DecodeCxt,
        ) -> Result<<C as Codec>::Object, <C as Codec>::Error>
        + Send
        + Sync,
>;

pub type Serializer<C> = Arc<
    dyn Fn(&<C as Codec>::Object, &mut BytesMut, &<C as Codec>::EncodeCxt)
        + Send
        + Sync,
>;

// Parser/serializer registry for one codec family.
//
// Lookups are lock-free snapshot loads. Registration and removal serialize
// through a mutex and publish a new copy of the affected table.
pub struct Registry<C: Codec> {
    inner: Arc<RegistryInner<C>>,
}

struct RegistryInner<C: Codec> {
    parsers: ArcSwap<BTreeMap<C::Key, Parser<C>>>,
    serializers: ArcSwap<BTreeMap<C::Key, Serializer<C>>>,
    write_lock: Mutex<()>,
}

/// Handle returned by the registration functions.
///
/// Dropping the handle (or calling [`Registration::unregister`]) removes the
/// registered entry, unless [`Registration::detach`] was called.
#[must_use = "dropping the handle unregisters the entry"]
pub struct Registration {
    unregister: Option<Box<dyn FnOnce() + Send + Sync>>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseError<K, E> {
    UnknownType(K),
    Decode(E),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnknownType<K>(pub K);

// Bundle of all codec registries used by the BGP message codec.
//
// There's no process-wide instance: callers build one and pass it down
// explicitly (usually as `Arc<CodecRegistry>`).
pub struct CodecRegistry {
    pub attrs: Registry<AttrCodec>,
    pub nlri: Registry<NlriCodec>,
    pub info_tlvs: Registry<InfoTlvCodec>,
    pub stat_tlvs: Registry<StatTlvCodec>,
}

// ===== impl Registry =====

impl<C: Codec> Registry<C> {
    pub fn new() -> Self {
        Registry {
            inner: Arc::new(RegistryInner {
                parsers: Default::default(),
                serializers: Default::default(),
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Registers a parser for the given type.
    ///
    /// # Panics
    ///
    /// Panics if a parser is already registered for `key`.
    pub fn register_parser<F>(&self, key: C::Key, parser: F) -> Registration
    where
        F: Fn(&mut Bytes, &C::DecodeCxt) -> Result<C::Object, C::Error>
            + Send
            + Sync
            + 'static,
    {
        let parser: Parser<C> = Arc::new(parser);
        RegistryInner::insert(&self.inner.parsers, &self.inner, key, &parser);

        let inner = Arc::downgrade(&self.inner);
        Registration::new(move || {
            RegistryInner::remove(&inner, key, &parser, |inner| {
                &inner.parsers
            });
        })
    }

    /// Registers a serializer for the given type.
    ///
    /// # Panics
    ///
    /// Panics if a serializer is already registered for `key`.
    pub fn register_serializer<F>(
        &self,
        key: C::Key,
        serializer: F,
    ) -> Registration
    where
        F: Fn(&C::Object, &mut BytesMut, &C::EncodeCxt) + Send + Sync + 'static,
    {
        let serializer: Serializer<C> = Arc::new(serializer);
        RegistryInner::insert(
            &self.inner.serializers,
            &self.inner,
            key,
            &serializer,
        );

        let inner = Arc::downgrade(&self.inner);
        Registration::new(move || {
            RegistryInner::remove(&inner, key, &serializer, |inner| {
                &inner.serializers
            });
        })
    }

    /// Decodes an object of the given type.
    ///
    /// Unregistered types aren't fatal: `ParseError::UnknownType` is returned
    /// and the caller decides what to do with the undecoded value.
    pub fn parse(
        &self,
        key: C::Key,
        buf: &mut Bytes,
        cxt: &C::DecodeCxt,
    ) -> Result<C::Object, ParseError<C::Key, C::Error>> {
        let parser = self.inner.parsers.load().get(&key).cloned();
        let Some(parser) = parser else {
            Debug::CodecUnknownType(C::NAME, &key).log();
            return Err(ParseError::UnknownType(key));
        };

        (parser)(buf, cxt).map_err(ParseError::Decode)
    }

    /// Encodes an object using the serializer registered for its variant.
    pub fn serialize(
        &self,
        object: &C::Object,
        buf: &mut BytesMut,
        cxt: &C::EncodeCxt,
    ) -> Result<(), UnknownType<C::Key>> {
        let key = C::object_key(object);
        let serializer = self.inner.serializers.load().get(&key).cloned();
        let Some(serializer) = serializer else {
            Debug::CodecUnknownType(C::NAME, &key).log();
            return Err(UnknownType(key));
        };

        (serializer)(object, buf, cxt);
        Ok(())
    }

    // Returns whether a parser is registered for the given type.
    pub fn contains(&self, key: C::Key) -> bool {
        self.inner.parsers.load().contains_key(&key)
    }

    // Returns the list of types that have a registered parser.
    pub fn keys(&self) -> Vec<C::Key> {
        self.inner.parsers.load().keys().copied().collect()
    }
}

impl<C: Codec> Clone for Registry<C> {
    fn clone(&self) -> Self {
        Registry {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Codec> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> std::fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("codec", &C::NAME)
            .field("keys", &self.keys())
            .finish()
    }
}

// ===== impl RegistryInner =====

impl<C: Codec> RegistryInner<C> {
    fn insert<T: ?Sized>(
        table: &ArcSwap<BTreeMap<C::Key, Arc<T>>>,
        inner: &RegistryInner<C>,
        key: C::Key,
        entry: &Arc<T>,
    ) {
        let _guard = inner.write_lock.lock().unwrap();
        let mut map = BTreeMap::clone(&table.load());
        if map.contains_key(&key) {
            panic!("{}: duplicate registration for type {:?}", C::NAME, key);
        }
        map.insert(key, entry.clone());
        table.store(Arc::new(map));
    }

    fn remove<T: ?Sized>(
        inner: &Weak<RegistryInner<C>>,
        key: C::Key,
        entry: &Arc<T>,
        table: impl Fn(&RegistryInner<C>) -> &ArcSwap<BTreeMap<C::Key, Arc<T>>>,
    ) {
        // The registry itself may already be gone.
        let Some(inner) = inner.upgrade() else {
            return;
        };

        let _guard = inner.write_lock.lock().unwrap();
        let table = table(&inner);
        let current = table.load();

        // Only remove the entry this handle registered.
        if !current
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            return;
        }
        let mut map = BTreeMap::clone(&current);
        map.remove(&key);
        table.store(Arc::new(map));
    }
}

// ===== impl Registration =====

impl Registration {
    fn new(unregister: impl FnOnce() + Send + Sync + 'static) -> Registration {
        Registration {
            unregister: Some(Box::new(unregister)),
        }
    }

    /// Removes the registered entry.
    pub fn unregister(mut self) {
        if let Some(unregister) = self.unregister.take() {
            (unregister)();
        }
    }

    /// Keeps the entry registered for as long as the registry lives.
    pub fn detach(mut self) {
        self.unregister = None;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            (unregister)();
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("active", &self.unregister.is_some())
            .finish()
    }
}

// ===== impl ParseError =====

impl<K, E> std::fmt::Display for ParseError<K, E>
where
    K: std::fmt::Debug,
    E: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::UnknownType(key) => {
                write!(f, "no parser registered for type {key:?}")
            }
            ParseError::Decode(error) => error.fmt(f),
        }
    }
}

impl<K, E> std::error::Error for ParseError<K, E>
where
    K: std::fmt::Debug,
    E: std::fmt::Display + std::fmt::Debug,
{
}

// ===== impl CodecRegistry =====

impl CodecRegistry {
    // Creates an empty set of registries.
    pub fn new() -> Self {
        CodecRegistry {
            attrs: Registry::new(),
            nlri: Registry::new(),
            info_tlvs: Registry::new(),
            stat_tlvs: Registry::new(),
        }
    }

    // Creates a set of registries with all built-in codecs registered.
    pub fn with_defaults() -> Self {
        let registry = CodecRegistry::new();
        for registration in attribute::register_codecs(&registry.attrs)
            .into_iter()
            .chain(nlri::register_codecs(&registry.nlri))
            .chain(tlv::register_info_codecs(&registry.info_tlvs))
            .chain(tlv::register_stat_codecs(&registry.stat_tlvs))
        {
            registration.detach();
        }
        registry
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        CodecRegistry::with_defaults()
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("attrs", &self.attrs)
            .field("nlri", &self.nlri)
            .field("info_tlvs", &self.info_tlvs)
            .field("stat_tlvs", &self.stat_tlvs)
            .finish()
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use std::thread;

    use bytes::{Buf, BufMut};

    use super::*;
    use crate::packet::consts::AfiSafi;

    struct TestCodec;

    #[derive(Debug, Eq, PartialEq)]
    enum TestObject {
        Byte(u8),
        Word(u16),
    }

    impl Codec for TestCodec {
        const NAME: &'static str = "test";

        type Key = u8;
        type Object = TestObject;
        type DecodeCxt = ();
        type EncodeCxt = ();
        type Error = ();

        fn object_key(object: &TestObject) -> u8 {
            match object {
                TestObject::Byte(_) => 1,
                TestObject::Word(_) => 2,
            }
        }
    }

    fn register_byte(registry: &Registry<TestCodec>) -> Registration {
        registry.register_parser(1, |buf, _| {
            buf.try_get_u8().map(TestObject::Byte).map_err(|_| ())
        })
    }

    #[test]
    fn parse_registered_and_unknown() {
        let registry = Registry::<TestCodec>::new();
        let _registration = register_byte(&registry);

        let mut buf = Bytes::from_static(&[7]);
        assert_eq!(registry.parse(1, &mut buf, &()), Ok(TestObject::Byte(7)));

        let mut buf = Bytes::from_static(&[0, 7]);
        assert_eq!(
            registry.parse(2, &mut buf, &()),
            Err(ParseError::UnknownType(2))
        );

        let mut buf = Bytes::new();
        assert_eq!(
            registry.parse(1, &mut buf, &()),
            Err(ParseError::Decode(()))
        );
    }

    #[test]
    fn release_unregisters() {
        let registry = Registry::<TestCodec>::new();
        let registration = register_byte(&registry);
        assert!(registry.contains(1));

        registration.unregister();
        assert!(!registry.contains(1));

        // The type can be registered again once released.
        let registration = register_byte(&registry);
        assert_eq!(registry.keys(), vec![1]);
        drop(registration);
        assert!(registry.keys().is_empty());
    }

    #[test]
    fn detached_registration_survives_drop() {
        let registry = Registry::<TestCodec>::new();
        register_byte(&registry).detach();
        assert!(registry.contains(1));
    }

    #[test]
    #[should_panic(expected = "duplicate registration")]
    fn duplicate_registration_panics() {
        let registry = Registry::<TestCodec>::new();
        let _first = register_byte(&registry);
        let _second = register_byte(&registry);
    }

    #[test]
    fn serialize_by_variant() {
        let registry = Registry::<TestCodec>::new();
        let _registration =
            registry.register_serializer(2, |object, buf, _| {
                let TestObject::Word(value) = object else {
                    unreachable!()
                };
                buf.put_u16(*value);
            });

        let mut buf = BytesMut::new();
        registry
            .serialize(&TestObject::Word(0x0102), &mut buf, &())
            .unwrap();
        assert_eq!(&buf[..], &[0x01, 0x02]);
        assert_eq!(
            registry.serialize(&TestObject::Byte(1), &mut buf, &()),
            Err(UnknownType(1))
        );
    }

    #[test]
    fn concurrent_lookups() {
        let registry = Registry::<TestCodec>::new();
        let _registration = register_byte(&registry);

        let handles = (0..4)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let mut buf = Bytes::copy_from_slice(&[i]);
                        let object = registry.parse(1, &mut buf, &()).unwrap();
                        assert_eq!(object, TestObject::Byte(i));
                        assert!(!buf.has_remaining());
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn default_codecs() {
        let registry = CodecRegistry::with_defaults();
        assert!(registry.attrs.contains(1));
        assert!(registry.attrs.contains(14));
        assert!(registry.nlri.contains(AfiSafi::LinkState));
        assert!(registry.info_tlvs.contains(2));
        assert!(registry.stat_tlvs.contains(5));
        assert!(registry.stat_tlvs.contains(6));
        assert!(registry.stat_tlvs.contains(10));
    }
}
