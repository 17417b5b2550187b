pub mod core;
pub mod storage;
pub mod schema;
pub mod model;
pub mod index;
pub mod query;

/*
┌──────────────────────────────────────────────────────────────────────────────┐
│                        HYBRIDAL STRUCT ARCHITECTURE                           │
└──────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────── MODEL LAYER ───────────────────────────────┐
│                                                                               │
│  ┌─────────────────────────────────────────────────────────────────────┐    │
│  │                         struct ObjectStore                           │    │
│  │  ┌───────────────────────────────────────────────────────────────┐ │    │
│  │  │ ctx: Arc<Context>                                             │ │    │
│  │  │   • config: Config               // TTLs, paging, policy      │ │    │
│  │  │   • persistent: Arc<dyn PersistentStore>                      │ │    │
│  │  │   • volatile: Arc<dyn VolatileStore>                          │ │    │
│  │  │   • registry: TypeRegistry       // resolved entity types     │ │    │
│  │  │   • counters: CacheCounters      // hit/miss per cache family │ │    │
│  │  └───────────────────────────────────────────────────────────────┘ │    │
│  └─────────────────────────────────────────────────────────────────────┘    │
│                                                                               │
│  ┌──────────────────────┐  ┌──────────────────────┐  ┌──────────────────┐   │
│  │ struct DataObject    │  │ struct Config        │  │ enum FieldValue  │   │
│  │ • guid / key         │  │ • namespace          │  │ • Null           │   │
│  │ • data / original    │  │ • object_ttl         │  │ • Str(String)    │   │
│  │ • policy / unsaved   │  │ • list_ttl_base/jit  │  │ • Int(i64)       │   │
│  │ • related caches     │  │ • page_size          │  │ • Float(f64)     │   │
│  └──────────────────────┘  │ • lock_ttl/poll/wait │  │ • Bool/List/Dict │   │
│                            └──────────────────────┘  └──────────────────┘   │
└───────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────── SCHEMA LAYER ──────────────────────────────┐
│                                                                               │
│  ┌──────────────────────┐  ┌──────────────────────┐  ┌──────────────────┐   │
│  │ struct EntityType    │  │ struct ResolvedType  │  │ struct DynamicDef│   │
│  │ • extends            │  │ • name (leaf)        │  │ • ttl            │   │
│  │ • properties         │  │ • aliases            │  │ • compute fn     │   │
│  │ • relations          │  │ • merged schema      │  └──────────────────┘   │
│  │ • dynamics           │  └──────────────────────┘                         │
│  └──────────────────────┘     TypeRegistry resolves base → leaf             │
└───────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────── QUERY / INDEX LAYER ──────────────────────────┐
│                                                                               │
│  ┌──────────────────────┐  ┌──────────────────────┐  ┌──────────────────┐   │
│  │ struct Query         │  │ query::list::run     │  │ invalidation     │   │
│  │ • object / select    │  │ • cache probe        │  │ • register       │   │
│  │ • filter: QueryNode  │  │ • dep derivation     │  │ • registered     │   │
│  │   (And/Or/Predicate) │  │ • pk scan + match    │  │ • invalidate     │   │
│  └──────────────────────┘  │ • verify + cache     │  └──────────────────┘   │
│                            └──────────────────────┘                          │
│  ┌──────────────────────┐  ┌──────────────────────────────────────────────┐ │
│  │ index::primary_keys  │  │ index::relations                             │ │
│  │ • chunked guid pages │  │ • ForeignRelation map per type               │ │
│  │ • prefix-scan fallbk │  │ • reverse sets w/ version tokens             │ │
│  └──────────────────────┘  └──────────────────────────────────────────────┘ │
└───────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────── STORAGE LAYER ─────────────────────────────┐
│                                                                               │
│  ┌──────────────────────┐  ┌──────────────────────┐  ┌──────────────────┐   │
│  │ trait PersistentStore│  │ trait VolatileStore  │  │ DistributedMutex │   │
│  │ • get/set/delete     │  │ • get/set/delete     │  │ • add-based lock │   │
│  │ • exists/prefix      │  │ • add (set-if-absent)│  │ • TTL self-expiry│   │
│  └──────────────────────┘  └──────────────────────┘  └──────────────────┘   │
│                                                                               │
│  InMemoryPersistentStore (BTreeMap)      InMemoryVolatileStore (LRU + TTL)   │
└───────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────── RELATIONSHIPS ───────────────────────────────┐
│                                                                               │
│  ObjectStore ──creates/loads──> DataObject ──persists via──> PersistentStore │
│       │                             │                                        │
│       │                             ├──caches in──> VolatileStore            │
│       │                             │                                        │
│       │                             └──save──> invalidation ──purges──> lists│
│       │                                                                      │
│       └──query──> list::run ──scans──> primary_keys ──falls back──> prefix   │
│                        │                                                     │
│                        └──registers deps──> invalidation (before the scan)   │
│                                                                               │
│  DataObject ──foreign_list──> relations::reverse_set ──locks──> Distributed  │
│                                                                  Mutex       │
└───────────────────────────────────────────────────────────────────────────────┘
*/
