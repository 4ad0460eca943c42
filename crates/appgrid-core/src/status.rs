//! Status state machines for apps, instances and jobs.
//!
//! Each status has a canonical lowercase, space-separated string form used
//! both on disk and on the wire (`ImageDownloaded` ↔ `"image downloaded"`).
//! The mapping is total in both directions:
//!
//! - rendering never fails; raw discriminants outside the defined set
//!   (see `from_repr`) render as `"unknown"`
//! - parsing never fails; any unrecognized string, `"unknown"` included,
//!   yields the designated `Unknown` value
//!
//! `"unknown"` is therefore the one point where the mapping is not
//! bijective. Storage compatibility depends on that, so do not "fix" it.
//!
//! Transition legality lives here as plain predicates. The registry stores
//! whatever it is given; the orchestration layer is expected to check
//! `can_transition_to` before it records a new status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Generates the string mapping, raw-discriminant conversion and serde
/// impls shared by all status enums.
macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $repr:literal => $text:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $repr,)+
            /// Default and invalid value; never a legal persisted state.
            #[default]
            Unknown = u8::MAX,
        }

        impl $name {
            /// All defined values except `Unknown`.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Canonical string form.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                    $name::Unknown => "unknown",
                }
            }

            /// Convert a raw discriminant; anything undefined becomes `Unknown`.
            pub fn from_repr(raw: u8) -> Self {
                match raw {
                    $($repr => $name::$variant,)+
                    _ => $name::Unknown,
                }
            }

            /// Parse the canonical string form; anything else becomes `Unknown`.
            pub fn from_str_lossy(s: &str) -> Self {
                match s {
                    $($text => $name::$variant,)+
                    _ => $name::Unknown,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self::from_str_lossy(s))
            }
        }

        impl From<u8> for $name {
            fn from(raw: u8) -> Self {
                Self::from_repr(raw)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Ok(Self::from_str_lossy(&s))
            }
        }
    };
}

status_enum! {
    /// Installation status of an app.
    AppStatus {
        NotInstalled = 0 => "not installed",
        ManifestDownloaded = 1 => "manifest downloaded",
        TokenAcquired = 2 => "token acquired",
        ImageDownloaded = 3 => "image downloaded",
        Installed = 4 => "installed",
        Removed = 5 => "removed",
        Purged = 6 => "purged",
        /// The manifest backing this app is gone.
        Orphaned = 7 => "orphaned",
    }
}

status_enum! {
    /// Lifecycle status of an app instance.
    InstanceStatus {
        NotCreated = 0 => "not created",
        Requested = 1 => "requested",
        ResourcesReady = 2 => "resources ready",
        Created = 3 => "created",
        Running = 4 => "running",
        Stopped = 5 => "stopped",
        /// The owning app is gone.
        Orphaned = 6 => "orphaned",
    }
}

status_enum! {
    /// Execution status of a scheduled job.
    JobStatus {
        Pending = 0 => "pending",
        Queued = 1 => "queued",
        Running = 2 => "running",
        Cancelled = 3 => "cancelled",
        Successful = 4 => "successful",
        Failed = 5 => "failed",
    }
}

impl AppStatus {
    /// Whether an orchestration step may move an app from `self` to `next`.
    ///
    /// Re-recording the current status is allowed so that resumed installs
    /// can write the entry again without special-casing.
    pub fn can_transition_to(self, next: AppStatus) -> bool {
        use AppStatus::*;

        if self == Unknown || next == Unknown {
            return false;
        }
        if self == next || next == Orphaned {
            return true;
        }
        matches!(
            (self, next),
            (NotInstalled, ManifestDownloaded)
                | (ManifestDownloaded, TokenAcquired)
                | (TokenAcquired, ImageDownloaded)
                | (ImageDownloaded, Installed)
                | (Installed, Removed)
                | (Removed, Purged)
                | (Orphaned, ManifestDownloaded)
        )
    }

    /// Whether the app has reached a usable state.
    pub fn is_installed(self) -> bool {
        self == AppStatus::Installed
    }
}

impl InstanceStatus {
    /// Whether an orchestration step may move an instance from `self` to `next`.
    pub fn can_transition_to(self, next: InstanceStatus) -> bool {
        use InstanceStatus::*;

        if self == Unknown || next == Unknown {
            return false;
        }
        if self == next || next == Orphaned {
            return true;
        }
        matches!(
            (self, next),
            (NotCreated, Requested)
                | (Requested, ResourcesReady)
                | (ResourcesReady, Created)
                | (Created, Running)
                | (Created, Stopped)
                | (Running, Stopped)
                | (Stopped, Running)
        )
    }

    /// Whether a container exists for the instance and it may be started.
    pub fn is_runnable(self) -> bool {
        matches!(
            self,
            InstanceStatus::Created | InstanceStatus::Running | InstanceStatus::Stopped
        )
    }
}

impl JobStatus {
    /// `Cancelled`, `Successful` or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Cancelled | JobStatus::Successful | JobStatus::Failed
        )
    }
}
