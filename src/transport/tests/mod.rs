mod ip;
mod usb;
