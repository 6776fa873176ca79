//! AV registration arbitration
//!
//! The source side (AV) and sink side (AVK) of the profile share one stream transport
//! registration, one remote-control transport registration and the AVRCP service records. The
//! arbiter reference counts those registrations by role so the collaborators see exactly one
//! register/deregister pair no matter how many roles come and go.

use crate::constants::uuid;
use crate::platform::{RemoteControl, ServiceDiscovery, Transport};

/// Local profile role sharing the registrations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ArRole {
    /// Source side
    Av = 0x01,
    /// Sink side
    Avk = 0x02,
}

impl ArRole {
    const fn mask(self) -> u8 {
        self as u8
    }

    const fn slot(self) -> usize {
        self as usize - 1
    }
}

/// Registration arbiter state
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Arbiter {
    avdt_registered: u8,
    avct_registered: u8,
    tg_registered: u8,
    tg_record: Option<u32>,
    ct_record: Option<u32>,
    ct_categories: [u16; 2],
}

impl Arbiter {
    /// Fresh arbiter with nothing registered
    #[must_use]
    pub const fn new() -> Self {
        Self {
            avdt_registered: 0,
            avct_registered: 0,
            tg_registered: 0,
            tg_record: None,
            ct_record: None,
            ct_categories: [0; 2],
        }
    }

    /// Roles currently holding the stream transport
    #[must_use]
    pub const fn avdt_roles(&self) -> u8 {
        self.avdt_registered
    }

    /// Roles currently holding the remote-control transport
    #[must_use]
    pub const fn avct_roles(&self) -> u8 {
        self.avct_registered
    }

    /// Record handle of the AVRCP target record
    #[must_use]
    pub const fn tg_record(&self) -> Option<u32> {
        self.tg_record
    }

    /// Record handle of the AVRCP controller record
    #[must_use]
    pub const fn ct_record(&self) -> Option<u32> {
        self.ct_record
    }

    /// Register `role` with the stream transport
    pub fn reg_avdt<P: Transport>(&mut self, platform: &mut P, role: ArRole, sec_mask: u8) {
        if self.avdt_registered == 0 {
            debug!("[AR] registering stream transport");
            if let Err(e) = platform.register_avdt(sec_mask) {
                error!("[AR] stream transport registration failed: {:?}", e);
                return;
            }
        }
        self.avdt_registered |= role.mask();
    }

    /// Drop `role` from the stream transport
    pub fn dereg_avdt<P: Transport>(&mut self, platform: &mut P, role: ArRole) {
        if self.avdt_registered & role.mask() == 0 {
            return;
        }
        self.avdt_registered &= !role.mask();
        if self.avdt_registered == 0 {
            debug!("[AR] deregistering stream transport");
            platform.deregister_avdt();
        }
    }

    /// A signalling channel came up for `role`; returns the other registered roles to notify
    #[must_use]
    pub const fn avdt_conn(&self, role: ArRole) -> u8 {
        self.avdt_registered & !role.mask()
    }

    /// Register `role` with the remote-control transport
    pub fn reg_avct<P: RemoteControl>(&mut self, platform: &mut P, role: ArRole, mtu: u16, sec_mask: u8) {
        if self.avct_registered == 0 {
            debug!("[AR] registering remote-control transport");
            platform.register_avct(mtu, sec_mask);
        }
        self.avct_registered |= role.mask();
    }

    /// Drop `role` from the remote-control transport
    pub fn dereg_avct<P: RemoteControl>(&mut self, platform: &mut P, role: ArRole) {
        if self.avct_registered & role.mask() == 0 {
            return;
        }
        self.avct_registered &= !role.mask();
        if self.avct_registered == 0 {
            debug!("[AR] deregistering remote-control transport");
            platform.deregister_avct();
        }
    }

    /// Register an AVRCP service record for `role`.
    ///
    /// Only one target record exists (first come, first served). Controller categories are merged
    /// across roles into a single record.
    pub fn reg_avrc<P: ServiceDiscovery>(
        &mut self,
        platform: &mut P,
        service_uuid: u16,
        role: ArRole,
        categories: u16,
    ) {
        if categories == 0 {
            return;
        }
        match service_uuid {
            uuid::AV_REM_CTRL_TARGET => {
                if self.tg_record.is_some() {
                    debug!("[AR] target record already owned by {=u8:#x}", self.tg_registered);
                    return;
                }
                match platform.add_avrc_record(service_uuid, categories) {
                    Ok(record) => {
                        self.tg_record = Some(record);
                        self.tg_registered = role.mask();
                    }
                    Err(e) => error!("[AR] target record creation failed: {:?}", e),
                }
            }
            uuid::AV_REMOTE_CONTROL | uuid::AV_REM_CTRL_CONTROL => {
                self.ct_categories[role.slot()] = categories;
                let merged = self.ct_merged();
                match self.ct_record {
                    Some(record) => platform.update_avrc_categories(record, merged),
                    None => match platform.add_avrc_record(service_uuid, merged) {
                        Ok(record) => self.ct_record = Some(record),
                        Err(e) => error!("[AR] controller record creation failed: {:?}", e),
                    },
                }
            }
            _ => warn!("[AR] not an AVRC service class: {=u16:#x}", service_uuid),
        }
    }

    /// Withdraw `role` from an AVRCP service record
    pub fn dereg_avrc<P: ServiceDiscovery>(&mut self, platform: &mut P, service_uuid: u16, role: ArRole) {
        match service_uuid {
            uuid::AV_REM_CTRL_TARGET => {
                if let Some(record) = self.tg_record
                    && self.tg_registered == role.mask()
                {
                    platform.delete_record(record);
                    self.tg_record = None;
                    self.tg_registered = 0;
                }
            }
            uuid::AV_REMOTE_CONTROL | uuid::AV_REM_CTRL_CONTROL => {
                let Some(record) = self.ct_record else {
                    return;
                };
                self.ct_categories[role.slot()] = 0;
                let merged = self.ct_merged();
                if merged == 0 {
                    platform.delete_record(record);
                    self.ct_record = None;
                } else {
                    platform.update_avrc_categories(record, merged);
                }
            }
            _ => {}
        }
    }

    const fn ct_merged(&self) -> u16 {
        self.ct_categories[0] | self.ct_categories[1]
    }
}
