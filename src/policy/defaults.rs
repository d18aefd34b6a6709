//! Built-in policy used when the config leaves a list unset.

pub const WHITELISTED_TAGS: &[(&str, &[&str])] = &[
    ("audio", &["controls", "src"]),
    ("video", &["poster", "controls", "height", "width", "src"]),
    ("source", &["src", "type"]),
    ("dt", &[]),
    ("dd", &[]),
    ("dl", &[]),
    ("table", &[]),
    ("caption", &[]),
    ("tr", &[]),
    ("th", &[]),
    ("td", &[]),
    ("tbody", &[]),
    ("thead", &[]),
    ("h2", &[]),
    ("h3", &[]),
    ("h4", &[]),
    ("h5", &[]),
    ("h6", &[]),
    ("abbr", &["title"]),
    ("acronym", &["title"]),
    ("br", &[]),
    ("del", &[]),
    ("code", &[]),
    ("em", &[]),
    ("strong", &[]),
    ("b", &[]),
    ("i", &[]),
    ("strike", &[]),
    ("blockquote", &[]),
    ("q", &["cite"]),
    ("pre", &[]),
    ("p", &[]),
    ("ul", &[]),
    ("li", &[]),
    ("ol", &[]),
    ("img", &["alt", "title", "src", "height", "width"]),
    ("figure", &[]),
    ("figcaption", &[]),
    ("cite", &[]),
    ("time", &["datetime"]),
    ("iframe", &["width", "height", "frameborder", "src", "allowfullscreen"]),
    ("a", &["href", "title"]),
    ("small", &[]),
    ("sup", &[]),
    ("sub", &[]),
    ("hr", &[]),
];

pub const REQUIRED_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("a", &["href"]),
    ("img", &["src"]),
    ("iframe", &["src"]),
];

pub const ATTRIBUTE_OVERRIDES: &[(&str, &[(&str, &str)])] = &[
    ("a", &[("rel", "noopener noreferrer"), ("target", "_blank")]),
    ("video", &[("controls", "true")]),
];

pub const INTEGER_ATTRIBUTES: &[&str] = &["width", "height", "frameborder"];

pub const MEDIA_ATTRIBUTES: &[&str] = &["src", "href", "poster"];

pub const MEDIA_BLACKLIST: &[&str] = &[
    "api.flattr.com",
    "feeds.feedburner.com",
    "share.feedsportal.com",
    "da.feedsportal.com",
    "rc.feedsportal.com",
    "rss.feedsportal.com",
    "res.feedsportal.com",
    "res1.feedsportal.com",
    "res2.feedsportal.com",
    "res3.feedsportal.com",
    "pi.feedsportal.com",
    "rss.nytimes.com",
    "feeds.wordpress.com",
    "stats.wordpress.com",
    "rss.cnn.com",
    "twitter.com/home?status=",
    "twitter.com/share",
    "twitter_icon_large.png",
    "www.facebook.com/sharer.php",
    "facebook_icon_large.png",
    "plus.google.com/share",
    "www.gstatic.com/images/icons/gplus-16.png",
    "www.gstatic.com/images/icons/gplus-32.png",
    "www.gstatic.com/images/icons/gplus-64.png",
];

pub const SCHEME_WHITELIST: &[&str] = &[
    "//",
    "data:image/png;base64,",
    "data:image/gif;base64,",
    "data:image/jpg;base64,",
    "data:image/jpeg;base64,",
    "bitcoin:",
    "callto:",
    "ed2k://",
    "facetime://",
    "feed:",
    "ftp://",
    "geo:",
    "git://",
    "http://",
    "https://",
    "irc://",
    "irc6://",
    "ircs://",
    "jabber:",
    "magnet:",
    "mailto:",
    "nntp://",
    "rtmp://",
    "sftp://",
    "sip:",
    "sips:",
    "skype:",
    "smb://",
    "sms:",
    "spotify:",
    "ssh:",
    "steam:",
    "svn://",
    "tel:",
];

pub const IFRAME_WHITELIST: &[&str] = &[
    "//www.youtube.com",
    "//www.youtube-nocookie.com",
    "https://player.vimeo.com",
    "https://www.dailymotion.com",
];
