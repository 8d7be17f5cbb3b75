mod long_seek;
mod short_seek;
