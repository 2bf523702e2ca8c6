//! Bootloader console vocabulary.
//!
//! The markers the automation waits for, the commands it types, and the
//! flash layout of the two firmware banks.

use std::fmt;

/// Interrupt character that stops the autoboot countdown (Ctrl-C).
pub const INTERRUPT_CHAR: u8 = 0x03;

/// Console markers, matched literally.
pub mod markers {
    /// Start of the bootloader's self-identification line.
    pub const UBOOT_BANNER: &str = "U-Boot";
    /// Printed by an unlocked bootloader before autoboot.
    pub const AUTOBOOT_PROMPT: &str = "Press SPACE to delay and Ctrl-C to abort autoboot";
    /// Offered by the firmware while it boots.
    pub const FAILSAFE_PROMPT: &str = "Press the [f] key and hit [enter] to enter failsafe mode";
    /// Root shell prompt in failsafe mode.
    pub const ROOT_PROMPT: &str = "root@(none)";
    /// Bootloader prompt seen after a baud rate change.
    pub const BAUD_BANNER: &str = "FALCON";
    /// Printed by `loady` once the image is in RAM.
    pub const TOTAL_SIZE: &str = "Total Size";
}

/// Key that selects failsafe mode, followed by enter.
pub const FAILSAFE_KEY: &[u8] = b"f\n";

/// `setenv <var> <value>`.
pub fn setenv(var: &str, value: &str) -> String {
    format!("setenv {var} {value}\n")
}

/// Persist the environment.
pub const SAVEENV: &str = "saveenv\n";

/// Reboot.
pub const RESET: &str = "reset\n";

/// Environment patch that keeps the console usable on every boot.
///
/// Each entry is the progress message and the command line.
pub fn unlock_patch() -> [(&'static str, String); 4] {
    [
        ("Set U-Boot bootdelay to 5...", setenv("bootdelay", "5")),
        ("Enable ASC serial...", setenv("asc0", "0")),
        (
            "Set GPIO to unlock serial...",
            setenv(
                "preboot",
                "\"gpio set 3;gpio input 2;gpio input 105;gpio input 106;gpio input 107;gpio input 108\"",
            ),
        ),
        ("Save changes...", SAVEENV.to_string()),
    ]
}

/// Remount root, and point the restricted login shell at a full shell.
pub const ENABLE_FULL_SHELL: &str = "mount_root && mkdir -p /overlay/etc && sed \"s|/opt/lantiq/bin/minishell|/bin/ash|g\" /rom/etc/passwd > /overlay/etc/passwd\n";

/// Unmount the overlay so the patched passwd is written out.
pub const UNMOUNT_OVERLAY: &str = "umount /overlay && umount -a\n";

/// Change the console baud rate.
pub fn set_baudrate(baud_rate: u32) -> String {
    setenv("baudrate", &baud_rate.to_string())
}

/// Receive a YMODEM image at `load_addr`.
pub fn loady(load_addr: u32) -> String {
    format!("loady 0x{load_addr:X}\n")
}

/// One of the two firmware banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FirmwareBank {
    /// `image0`.
    Bank0,
    /// `image1`.
    Bank1,
}

impl FirmwareBank {
    /// Both banks, in index order.
    pub const ALL: [Self; 2] = [Self::Bank0, Self::Bank1];

    /// Index used in the environment (`committed_image`, `imageN_is_valid`).
    pub fn index(self) -> u8 {
        match self {
            Self::Bank0 => 0,
            Self::Bank1 => 1,
        }
    }

    /// Bank for an environment index.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Bank0),
            1 => Some(Self::Bank1),
            _ => None,
        }
    }
}

impl fmt::Display for FirmwareBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image{}", self.index())
    }
}

/// A flash range, in SPI flash offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BankRegion {
    /// Start offset.
    pub offset: u32,
    /// Length in bytes.
    pub length: u32,
}

impl BankRegion {
    /// `<offset> <length>` in the bootloader's hex notation.
    pub fn sf_args(&self) -> String {
        format!("{:X} {:X}", self.offset, self.length)
    }
}

/// Where images are loaded and where each bank lives.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BankLayout {
    /// RAM address `loady` writes the image to.
    pub ram_load_addr: u32,
    /// Flash region of `image0`.
    pub bank0: BankRegion,
    /// Flash region of `image1`.
    pub bank1: BankRegion,
}

impl Default for BankLayout {
    fn default() -> Self {
        Self {
            ram_load_addr: 0x8080_0000,
            bank0: BankRegion {
                offset: 0x000C_0000,
                length: 0x0074_0000,
            },
            bank1: BankRegion {
                offset: 0x0080_0000,
                length: 0x0080_0000,
            },
        }
    }
}

impl BankLayout {
    /// Flash region of `bank`.
    pub fn region(&self, bank: FirmwareBank) -> BankRegion {
        match bank {
            FirmwareBank::Bank0 => self.bank0,
            FirmwareBank::Bank1 => self.bank1,
        }
    }

    /// Erase and program `bank` from RAM, mark it committed and valid,
    /// save, and reboot, as one command line.
    pub fn commit_command(&self, bank: FirmwareBank) -> String {
        let region = self
            .region(bank)
            .sf_args();
        let index = bank.index();
        format!(
            "sf probe 0 && sf erase {region} && sf write {load:X} {region} && setenv committed_image {index} && setenv image{index}_is_valid 1 && saveenv && reset\n",
            load = self.ram_load_addr,
        )
    }
}
