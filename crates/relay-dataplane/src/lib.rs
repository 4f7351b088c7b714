//! OpenRelay Dataplane - record dispatch engine
//!
//! Takes framed records from any number of inputs, drops the ones the
//! method whitelist rejects (and everything that answers them), and hands
//! the rest to outputs according to the routing policy.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                           EMITTER                              │
//! │                                                                │
//! │  ┌─────────┐   ┌──────────┐   ┌──────────────┐   ┌──────────┐  │
//! │  │ Input 0 │──►│          │   │    FILTER    │   │          │  │
//! │  ├─────────┤   │ ENVELOPE │   │              │   │  ROUTER  │  │
//! │  │ Input 1 │──►│  decode  │──►│  whitelist   │──►│          │  │
//! │  ├─────────┤   │          │   │      │       │   │ bcast    │  │
//! │  │ Input N │──►│          │   │      ▼       │   │ rr       │  │
//! │  └─────────┘   └──────────┘   │ verdict cache│   │ affinity │  │
//! │                               └──────────────┘   └────┬─────┘  │
//! │                                                       │        │
//! │                               ┌──────────┬────────────┤        │
//! │                               ▼          ▼            ▼        │
//! │                          Output 0    Output 1 ... Output M     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Routing
//!
//! | split_output | recognize_tcp_sessions | Policy |
//! |--------------|------------------------|--------|
//! | false | false | Broadcast |
//! | true | false | Round-robin |
//! | true | true | Session affinity |
//! | false | true | rejected |

#![warn(missing_docs)]

pub mod config;
pub mod emitter;
pub mod envelope;
pub mod filter;
pub mod plugin;
pub mod router;
pub mod stats;
pub mod verdict;

pub use config::{EmitterConfig, ModifierConfig, RoutingConfig, VerdictCacheConfig};
pub use emitter::{Emitter, EmitterError, EmitterHandle, EmitterState};
pub use envelope::{decode, frame, Envelope, EnvelopeError, Header, HeaderShape};
pub use filter::{FilterStage, MethodWhitelist};
pub use plugin::{Input, MemoryInput, MemoryOutput, MemorySource, Output};
pub use router::{RoutingPolicy, Router};
pub use stats::{EmitterStats, EmitterStatsSnapshot};
pub use verdict::{Verdict, VerdictCache};
